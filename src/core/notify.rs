//! Desktop notification dispatch.

use async_trait::async_trait;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Longest a notification command may run before it is killed.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `command` to completion, killing it after `limit`. `Ok(None)` means it
/// timed out.
async fn run_bounded(command: &mut Command, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
    command.kill_on_drop(true);
    match tokio::time::timeout(limit, command.status()).await {
        Ok(status) => status.map(Some),
        Err(_) => Ok(None),
    }
}

/// Best-effort notification sink. Failures are logged, never returned.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, title: &str, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopNotifier {
    /// `notify-send` on Linux desktops.
    NotifySend,
    /// `osascript` on macOS.
    AppleScript,
    /// Plain stdout, for every other platform.
    Console,
}

impl DesktopNotifier {
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") {
            DesktopNotifier::NotifySend
        } else if cfg!(target_os = "macos") {
            DesktopNotifier::AppleScript
        } else {
            DesktopNotifier::Console
        }
    }
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl Notify for DesktopNotifier {
    async fn notify(&self, title: &str, message: &str) {
        let mut command = match self {
            DesktopNotifier::NotifySend => {
                let mut cmd = Command::new("notify-send");
                cmd.arg(title).arg(message);
                cmd
            }
            DesktopNotifier::AppleScript => {
                let script = format!(
                    "display notification \"{}\" with title \"{}\"",
                    escape_applescript(message),
                    escape_applescript(title)
                );
                let mut cmd = Command::new("osascript");
                cmd.arg("-e").arg(script);
                cmd
            }
            DesktopNotifier::Console => {
                println!("\n{title}\n{message}\n");
                return;
            }
        };

        debug!(notifier = ?self, title, "Dispatching notification");
        match run_bounded(&mut command, NOTIFY_TIMEOUT).await {
            Ok(Some(status)) if status.success() => {}
            Ok(Some(status)) => warn!(notifier = ?self, %status, "Notification command failed"),
            Ok(None) => {
                warn!(notifier = ?self, timeout = ?NOTIFY_TIMEOUT, "Notification command timed out");
                println!("\n{title}\n{message}\n");
            }
            Err(e) => {
                warn!(notifier = ?self, error = %e, "Could not run notification command");
                println!("\n{title}\n{message}\n");
            }
        }
    }
}
