//! Linux clipboard access via `wl-copy`/`wl-paste` (Wayland) or `xclip` (X11).
//!
//! ## Display detection
//!
//! Strategy, in priority order: (1) inherit `WAYLAND_DISPLAY`/`DISPLAY` from
//! the process environment if set; (2) otherwise scavenge the user's active
//! graphical session from `loginctl`; (3) otherwise scan `/tmp/.X11-unix` for
//! a live X11 socket and synthesize a `:N` display. For X11, the authority
//! cookie is additionally located via `XAUTHORITY`, `~/.Xauthority`, or
//! `/run/user/<uid>/gdm/Xauthority`.
//!
//! None of this ever panics or aborts the daemon — a missing display or
//! clipboard tool is logged and leaves `copy`/`paste` as no-ops.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, error, info, warn};

pub trait Clipboard: Send + Sync {
    fn copy(&self, text: &str);
    fn paste(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Wayland,
    X11,
}

/// Detects the active graphical session once at construction and caches the
/// chosen backend plus the environment variables needed to reach it.
pub struct LinuxClipboard {
    backend: Backend,
    env: HashMap<String, String>,
}

impl LinuxClipboard {
    pub fn detect() -> Self {
        if let Some((backend, env)) = Self::try_inherit_from_environment() {
            return Self { backend, env };
        }
        if let Some((backend, env)) = Self::try_detect_via_loginctl() {
            return Self { backend, env };
        }
        if let Some((backend, env)) = Self::try_detect_via_socket_scan() {
            return Self { backend, env };
        }
        error!("no graphical display found; clipboard will not work");
        Self {
            backend: Backend::X11,
            env: HashMap::new(),
        }
    }

    fn try_inherit_from_environment() -> Option<(Backend, HashMap<String, String>)> {
        if let Ok(display) = std::env::var("WAYLAND_DISPLAY") {
            let mut env = HashMap::new();
            env.insert("WAYLAND_DISPLAY".to_string(), display);
            return Some((Backend::Wayland, env));
        }
        if let Ok(display) = std::env::var("DISPLAY") {
            let mut env = HashMap::new();
            env.insert("DISPLAY".to_string(), display);
            return Some((Backend::X11, env));
        }
        None
    }

    fn try_detect_via_loginctl() -> Option<(Backend, HashMap<String, String>)> {
        let user = std::env::var("USER").ok().or_else(|| {
            Command::new("whoami")
                .output()
                .ok()
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        })?;

        let output = Command::new("loginctl")
            .args(["list-sessions", "--no-legend"])
            .output()
            .ok()?;
        let listing = String::from_utf8_lossy(&output.stdout);

        for line in listing.lines() {
            let session_id = line.split_whitespace().next()?;
            if !line.contains(&user) {
                continue;
            }
            if let Some(result) = Self::try_configure_from_session(session_id) {
                return Some(result);
            }
        }
        None
    }

    fn try_configure_from_session(session_id: &str) -> Option<(Backend, HashMap<String, String>)> {
        let session_type = run_loginctl_prop(session_id, "Type")?;
        let display_val = run_loginctl_prop(session_id, "Display")?;
        if display_val.is_empty() {
            return None;
        }

        let backend = if session_type == "wayland" {
            Backend::Wayland
        } else {
            Backend::X11
        };

        let mut env = HashMap::new();
        if backend == Backend::Wayland {
            env.insert("WAYLAND_DISPLAY".to_string(), display_val.clone());
        } else {
            env.insert("DISPLAY".to_string(), display_val.clone());
            if let Some(xauth) = Self::find_xauthority() {
                info!(path = %xauth.display(), "XAUTHORITY scavenged");
                env.insert("XAUTHORITY".to_string(), xauth.display().to_string());
            }
        }

        info!(session_id, %session_type, display = %display_val, "environment detected via loginctl");
        Some((backend, env))
    }

    fn try_detect_via_socket_scan() -> Option<(Backend, HashMap<String, String>)> {
        let socket_dir = Path::new("/tmp/.X11-unix");
        let entries = std::fs::read_dir(socket_dir).ok()?;

        let mut sockets: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with('X'))
            .collect();
        sockets.sort();
        let first = sockets.first()?;

        let display = format!(":{}", &first[1..]);
        let mut env = HashMap::new();
        env.insert("DISPLAY".to_string(), display.clone());
        if let Some(xauth) = Self::find_xauthority() {
            env.insert("XAUTHORITY".to_string(), xauth.display().to_string());
        }

        info!(%display, "display detected via socket scan");
        Some((Backend::X11, env))
    }

    fn find_xauthority() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("XAUTHORITY") {
            return Some(PathBuf::from(path));
        }
        if let Some(home) = std::env::var_os("HOME") {
            let candidate = PathBuf::from(home).join(".Xauthority");
            if candidate.exists() {
                return Some(candidate);
            }
        }
        if let Some(uid) = current_uid() {
            let candidate = PathBuf::from(format!("/run/user/{uid}/gdm/Xauthority"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    fn commands(&self) -> (&'static [&'static str], &'static [&'static str]) {
        match self.backend {
            Backend::Wayland => (&["wl-copy"], &["wl-paste"]),
            Backend::X11 => (
                &["xclip", "-selection", "clipboard"],
                &["xclip", "-selection", "clipboard", "-out"],
            ),
        }
    }
}

impl Clipboard for LinuxClipboard {
    fn copy(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let (copy_cmd, _) = self.commands();

        let mut command = Command::new(copy_cmd[0]);
        command
            .args(&copy_cmd[1..])
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(tool = copy_cmd[0], "failed to copy to clipboard: {e}");
                return;
            }
        };

        if let Some(stdin) = child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                error!("failed to write to clipboard tool stdin: {e}");
            }
        }
        drop(child.stdin.take());

        std::thread::sleep(Duration::from_millis(100));

        match child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                let stderr = child
                    .stderr
                    .take()
                    .map(|mut s| {
                        let mut buf = String::new();
                        std::io::Read::read_to_string(&mut s, &mut buf).ok();
                        buf
                    })
                    .unwrap_or_default();
                error!(%status, stderr, "clipboard process died");
            }
            Ok(_) => debug!(chars = text.len(), "copied to clipboard"),
            Err(e) => warn!("could not poll clipboard process: {e}"),
        }
    }

    fn paste(&self) -> String {
        let (_, paste_cmd) = self.commands();

        let output = Command::new(paste_cmd[0])
            .args(&paste_cmd[1..])
            .envs(&self.env)
            .output();

        match output {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).to_string(),
            Ok(out) => {
                error!(stderr = %String::from_utf8_lossy(&out.stderr), "clipboard paste failed");
                String::new()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(tool = paste_cmd[0], "clipboard tool not found; install xclip or wl-clipboard");
                String::new()
            }
            Err(e) => {
                error!("failed to paste from clipboard: {e}");
                String::new()
            }
        }
    }
}

fn run_loginctl_prop(session_id: &str, prop: &str) -> Option<String> {
    let output = Command::new("loginctl")
        .args(["show-session", session_id, "-p", prop, "--value"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Current numeric user id, via `id -u` — avoids a direct libc FFI call.
fn current_uid() -> Option<String> {
    let output = Command::new("id").arg("-u").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_of_empty_text_is_noop() {
        // Exercising the early return doesn't require a real display; it
        // must never attempt to spawn a clipboard tool.
        let clipboard = LinuxClipboard {
            backend: Backend::X11,
            env: HashMap::new(),
        };
        clipboard.copy("");
    }

    #[test]
    fn commands_select_wayland_tools() {
        let clipboard = LinuxClipboard {
            backend: Backend::Wayland,
            env: HashMap::new(),
        };
        let (copy_cmd, paste_cmd) = clipboard.commands();
        assert_eq!(copy_cmd[0], "wl-copy");
        assert_eq!(paste_cmd[0], "wl-paste");
    }

    #[test]
    fn commands_select_x11_tools() {
        let clipboard = LinuxClipboard {
            backend: Backend::X11,
            env: HashMap::new(),
        };
        let (copy_cmd, paste_cmd) = clipboard.commands();
        assert_eq!(copy_cmd[0], "xclip");
        assert_eq!(paste_cmd[0], "xclip");
    }
}
