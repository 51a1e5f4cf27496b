//! Desktop notifications via `notify-send`. Best-effort, never fatal.

use std::process::{Command, Stdio};

use tracing::{error, warn};

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

pub struct LinuxNotifier;

impl Notifier for LinuxNotifier {
    fn notify(&self, title: &str, body: &str) {
        let result = Command::new("notify-send")
            .arg(title)
            .arg(body)
            .stderr(Stdio::null())
            .status();

        match result {
            Ok(status) if !status.success() => {
                warn!(%status, "notify-send exited non-zero");
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("notify-send not found, notification skipped");
            }
            Err(e) => {
                error!("failed to send notification: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_does_not_panic_when_tool_is_missing() {
        // notify-send may or may not exist in the test environment; either
        // way this must not panic or propagate an error.
        LinuxNotifier.notify("title", "body");
    }
}
