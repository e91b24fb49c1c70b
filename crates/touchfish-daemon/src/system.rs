//! System collaborators backed by platform commands.
//!
//! The clipboard goes through `pbcopy`, `wl-copy` or `xclip`; URLs through
//! `open` or `xdg-open`. The window is owned by the presentation layer, so
//! window requests are forwarded to it as protocol messages.

use std::io::Write;
use std::process::{Command, Stdio};

use tokio::sync::mpsc;
use touchfish_core::dispatch::{Clipboard, ContentType, UrlOpener, WindowController};
use tracing::debug;

use crate::protocol::Outbound;

pub struct CommandClipboard {
    program: &'static str,
    args: &'static [&'static str],
}

impl CommandClipboard {
    /// Pick the clipboard command for this platform and session.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self {
                program: "pbcopy",
                args: &[],
            }
        } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            Self {
                program: "wl-copy",
                args: &[],
            }
        } else {
            Self {
                program: "xclip",
                args: &["-selection", "clipboard"],
            }
        }
    }
}

impl Clipboard for CommandClipboard {
    fn copy_data_to_clipboard(
        &self,
        data: &[u8],
        content_type: ContentType,
    ) -> std::io::Result<()> {
        debug!(
            "Copying {} bytes ({:?}) with {}",
            data.len(),
            content_type,
            self.program
        );

        let mut child = Command::new(self.program)
            .args(self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data)?;
        }

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "{} exited with {status}",
                self.program
            )))
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandUrlOpener;

impl UrlOpener for CommandUrlOpener {
    fn open_url(&self, application: Option<&str>, url: &str) -> std::io::Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            let mut command = Command::new("open");
            if let Some(app) = application {
                command.args(["-a", app]);
            }
            command
        } else if let Some(app) = application {
            Command::new(app)
        } else {
            Command::new("xdg-open")
        };

        debug!("Opening {} with {:?}", url, command.get_program());
        let mut child = command
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // A browser launched directly may keep running; reap it off-thread
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

/// Forwards window requests to the presentation layer.
pub struct ProtocolWindow {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ProtocolWindow {
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { outbound }
    }

    fn send(&self, visible: bool) -> std::io::Result<()> {
        self.outbound
            .send(Outbound::Window { visible })
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client gone"))
    }
}

impl WindowController for ProtocolWindow {
    fn activate(&self) -> std::io::Result<()> {
        self.send(true)
    }

    fn deactivate(&self) -> std::io::Result<()> {
        self.send(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_window_sends_visibility() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let window = ProtocolWindow::new(tx);

        window.deactivate().unwrap();
        window.activate().unwrap();

        assert_eq!(rx.try_recv().unwrap(), Outbound::Window { visible: false });
        assert_eq!(rx.try_recv().unwrap(), Outbound::Window { visible: true });
    }

    #[test]
    fn test_protocol_window_reports_closed_client() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let window = ProtocolWindow::new(tx);

        let err = window.deactivate().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_missing_opener_is_an_error() {
        let err = CommandUrlOpener
            .open_url(Some("/nonexistent/touchfish-browser"), "https://example.com");
        assert!(err.is_err() || cfg!(target_os = "macos"));
    }
}
