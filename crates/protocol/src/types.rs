//! Protocol type definitions
//!
//! Identity of the supported peripheral, the connection state broadcast to
//! listeners, and the verdict produced by decoding a connect-state frame.

use crate::error::ProtocolAnomaly;
use serde::{Deserialize, Serialize};
use std::fmt;

/// USB identity of a peripheral (vendor and product ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralIdentity {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
}

/// The only peripheral this manager recognizes
pub const KEYBOARD_IDENTITY: PeripheralIdentity = PeripheralIdentity {
    vendor_id: 0x3206,
    product_id: 0x3ffc,
};

impl PeripheralIdentity {
    /// Exact match against a discovered VID/PID pair
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Physical connection state of the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl ConnectionState {
    /// Numeric form used by downstream consumers (1 = connected, 0 = disconnected)
    pub fn as_raw(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// Result of decoding a connect-state response
///
/// `Connected` and `Disconnected` are terminal: the caller stops polling.
/// `Inconclusive` carries the diagnostic reason and never changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectVerdict {
    Connected,
    Disconnected,
    Inconclusive(ProtocolAnomaly),
}

impl ConnectVerdict {
    /// The state a terminal verdict reports, `None` when inconclusive
    pub fn state(&self) -> Option<ConnectionState> {
        match self {
            ConnectVerdict::Connected => Some(ConnectionState::Connected),
            ConnectVerdict::Disconnected => Some(ConnectionState::Disconnected),
            ConnectVerdict::Inconclusive(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_identity_matches_exactly() {
        assert!(KEYBOARD_IDENTITY.matches(0x3206, 0x3ffc));
        assert!(!KEYBOARD_IDENTITY.matches(0x3206, 0x3ffd));
        assert!(!KEYBOARD_IDENTITY.matches(0x3ffc, 0x3206));
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(KEYBOARD_IDENTITY.to_string(), "3206:3ffc");
    }

    #[test]
    fn test_connection_state_raw_values() {
        assert_eq!(ConnectionState::Connected.as_raw(), 1);
        assert_eq!(ConnectionState::Disconnected.as_raw(), 0);
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn test_verdict_state() {
        assert_eq!(
            ConnectVerdict::Connected.state(),
            Some(ConnectionState::Connected)
        );
        assert_eq!(
            ConnectVerdict::Disconnected.state(),
            Some(ConnectionState::Disconnected)
        );
        assert!(!ConnectVerdict::Inconclusive(ProtocolAnomaly::OverCharged).is_terminal());
    }
}
