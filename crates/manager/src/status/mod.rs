//! Keyboard driver status file
//!
//! The platform keyboard driver exposes a sysfs attribute that changes
//! whenever the link to the keyboard changes and accepts a few literal
//! commands. [`StatusFile`] writes those commands; [`watcher`] turns changes
//! of the file into engine work.

pub mod watcher;

pub use watcher::{ChangeSource, InotifyWatcher};

use clap::ValueEnum;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Commands understood by the keyboard driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusCommand {
    /// Re-enable the keyboard link
    EnableKeyboard,
    /// Reset the keyboard
    Reset,
    /// Reset the host side of the link
    HostReset,
}

impl StatusCommand {
    /// Literal written to the status file
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCommand::EnableKeyboard => "enable_keyboard",
            StatusCommand::Reset => "reset",
            StatusCommand::HostReset => "host_reset",
        }
    }
}

impl std::fmt::Display for StatusCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write `command` to the status file
    ///
    /// Failures are logged and otherwise ignored. Returns whether the
    /// command was written.
    pub fn write_command(&self, command: StatusCommand) -> bool {
        if !self.exists() {
            error!(
                "Status file {} does not exist, dropping '{}'",
                self.path.display(),
                command
            );
            return false;
        }

        let result = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .and_then(|mut file| {
                file.write_all(command.as_str().as_bytes())?;
                file.flush()
            });

        match result {
            Ok(()) => {
                info!("Wrote '{}' to {}", command, self.path.display());
                true
            }
            Err(e) => {
                error!(
                    "Failed to write '{}' to {}: {}",
                    command,
                    self.path.display(),
                    e
                );
                false
            }
        }
    }

    /// Current contents of the status file, trimmed
    pub fn read(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents.trim().to_string()),
            Err(e) => {
                debug!("Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_literals() {
        assert_eq!(StatusCommand::EnableKeyboard.as_str(), "enable_keyboard");
        assert_eq!(StatusCommand::Reset.as_str(), "reset");
        assert_eq!(StatusCommand::HostReset.as_str(), "host_reset");
        assert_eq!(StatusCommand::HostReset.to_string(), "host_reset");
    }

    #[test]
    fn test_cli_names() {
        let cmd = StatusCommand::from_str("host-reset", false).unwrap();
        assert_eq!(cmd, StatusCommand::HostReset);
        let cmd = StatusCommand::from_str("enable-keyboard", false).unwrap();
        assert_eq!(cmd, StatusCommand::EnableKeyboard);
    }

    #[test]
    fn test_write_command_overwrites_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conn_status");
        std::fs::write(&path, "").unwrap();

        let status = StatusFile::new(&path);
        assert!(status.write_command(StatusCommand::Reset));
        assert_eq!(status.read().as_deref(), Some("reset"));

        std::fs::write(&path, "").unwrap();
        assert!(status.write_command(StatusCommand::HostReset));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "host_reset");
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let status = StatusFile::new(dir.path().join("missing"));

        assert!(!status.write_command(StatusCommand::EnableKeyboard));
        // Must not create the file
        assert!(!status.exists());
        assert_eq!(status.read(), None);
    }
}
