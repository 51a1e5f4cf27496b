//! Platform shims: clipboard and desktop notifications.
//!
//! The daemon typically runs detached from any interactive login shell, so
//! the display environment it needs (`DISPLAY`/`WAYLAND_DISPLAY`, plus
//! `XAUTHORITY` under X11) is not necessarily inherited. [`LinuxClipboard`]
//! recovers it with a three-tier detection cascade before shelling out to
//! `wl-copy`/`xclip`.

pub mod clipboard;
pub mod notify;

pub use clipboard::{Clipboard, LinuxClipboard};
pub use notify::{LinuxNotifier, Notifier};
