//! Systemd service integration
//!
//! Minimal sd-notify client: readiness, stopping, watchdog keepalives and
//! a status line that follows the keyboard connection state. Every call is
//! a no-op when `NOTIFY_SOCKET` is not set.

use crate::state::KeyboardStateListener;
use anyhow::{Context, Result};
use protocol::ConnectionState;
use std::env;
use std::os::unix::net::UnixDatagram;
use std::time::Duration;
use tracing::{debug, error, info};

/// Messages understood by the service manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Ready,
    Stopping,
    Watchdog,
    Status(String),
}

impl Notification {
    fn payload(&self) -> String {
        match self {
            Notification::Ready => "READY=1".to_string(),
            Notification::Stopping => "STOPPING=1".to_string(),
            Notification::Watchdog => "WATCHDOG=1".to_string(),
            Notification::Status(status) => format!("STATUS={}", status),
        }
    }
}

/// Send `notification` to systemd
///
/// Returns false without error when not running under systemd.
pub fn notify(notification: Notification) -> Result<bool> {
    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        return Ok(false);
    };

    let payload = notification.payload();
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(payload.as_bytes(), &socket_path)
        .with_context(|| format!("Failed to send {} to systemd", payload))?;

    match notification {
        Notification::Watchdog | Notification::Status(_) => {
            debug!("Notified systemd: {}", payload)
        }
        _ => info!("Notified systemd: {}", payload),
    }
    Ok(true)
}

/// Check if running under systemd
pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

/// Keepalive interval: half the watchdog timeout systemd configured
pub fn watchdog_interval() -> Option<Duration> {
    let usec: u64 = env::var("WATCHDOG_USEC").ok()?.parse().ok()?;
    Some((Duration::from_micros(usec) / 2).max(Duration::from_secs(1)))
}

/// Spawn a task sending watchdog keepalives, if systemd asked for them
pub fn spawn_watchdog_task() -> Option<tokio::task::JoinHandle<()>> {
    let Some(interval) = watchdog_interval() else {
        debug!("Systemd watchdog not enabled");
        return None;
    };

    info!("Systemd watchdog enabled, interval: {:?}", interval);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = notify(Notification::Watchdog) {
                error!("Failed to send watchdog keepalive: {:#}", e);
            }
        }
    }))
}

/// Mirrors the keyboard state into `systemctl status`
pub struct StatusReporter;

impl KeyboardStateListener for StatusReporter {
    fn on_keyboard_state_changed(&self, state: ConnectionState) {
        let status = format!("Keyboard {}", state);
        if let Err(e) = notify(Notification::Status(status)) {
            error!("Failed to update systemd status: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payloads() {
        assert_eq!(Notification::Ready.payload(), "READY=1");
        assert_eq!(Notification::Stopping.payload(), "STOPPING=1");
        assert_eq!(Notification::Watchdog.payload(), "WATCHDOG=1");
        assert_eq!(
            Notification::Status("Keyboard connected".to_string()).payload(),
            "STATUS=Keyboard connected"
        );
    }

    #[test]
    fn test_notify_socket_handling() {
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }
        assert!(!is_systemd());
        assert!(!notify(Notification::Ready).unwrap());
        assert!(!notify(Notification::Status("idle".to_string())).unwrap());

        // Listener must not fail either
        StatusReporter.on_keyboard_state_changed(ConnectionState::Connected);

        // Same test: both halves mutate NOTIFY_SOCKET
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notify.sock");
        let receiver = UnixDatagram::bind(&path).unwrap();

        unsafe {
            env::set_var("NOTIFY_SOCKET", &path);
        }
        let sent = notify(Notification::Stopping).unwrap();
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }
        assert!(sent);

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"STOPPING=1");
    }

    #[test]
    fn test_watchdog_interval() {
        unsafe {
            env::remove_var("WATCHDOG_USEC");
        }
        assert!(watchdog_interval().is_none());

        unsafe {
            env::set_var("WATCHDOG_USEC", "30000000");
        }
        assert_eq!(watchdog_interval(), Some(Duration::from_secs(15)));

        // Never faster than once a second
        unsafe {
            env::set_var("WATCHDOG_USEC", "500000");
        }
        assert_eq!(watchdog_interval(), Some(Duration::from_secs(1)));

        unsafe {
            env::set_var("WATCHDOG_USEC", "invalid");
        }
        assert!(watchdog_interval().is_none());

        unsafe {
            env::remove_var("WATCHDOG_USEC");
        }
    }
}
