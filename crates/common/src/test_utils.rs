//! Test utilities for kbd-manager
//!
//! Builders for synthetic descriptors and frames shared by the unit and
//! integration tests of the workspace.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{connect_response, keyboard_configuration};
//!
//! let config = keyboard_configuration();
//! assert_eq!(config.interfaces.len(), 4);
//!
//! let frame = connect_response(0x23);
//! assert_eq!(frame[4], 0xA2);
//! ```

use crate::usb_types::{ConfigurationInfo, EndpointInfo, EndpointKind, InterfaceInfo};
use protocol::{FRAME_SIZE, Frame};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Status byte the keyboard reports when docked
pub const STATUS_CONNECTED: u8 = 0x23;

/// Status byte the keyboard reports when undocked
pub const STATUS_DISCONNECTED: u8 = 0x00;

/// Bulk OUT endpoint of the keyboard's command interface
pub const COMMAND_OUT_ADDRESS: u8 = 0x02;

/// Bulk IN endpoint of the keyboard's command interface
pub const COMMAND_IN_ADDRESS: u8 = 0x82;

/// Interrupt IN endpoint of the report interface
pub const REPORT_IN_ADDRESS: u8 = 0x84;

/// Create an interface descriptor
pub fn interface(number: u8, endpoints: Vec<EndpointInfo>) -> InterfaceInfo {
    InterfaceInfo {
        number,
        alternate_setting: 0,
        class_code: 0x03,
        endpoints,
    }
}

/// Configuration laid out like the real keyboard
///
/// - interface 0: boot keyboard, one interrupt IN endpoint
/// - interface 1: vendor command interface, bulk IN + bulk OUT
/// - interface 2: consumer control, one interrupt IN endpoint
/// - interface 3: vendor report interface, one interrupt IN endpoint
pub fn keyboard_configuration() -> ConfigurationInfo {
    ConfigurationInfo {
        number: 1,
        interfaces: vec![
            interface(0, vec![EndpointInfo::new(0x81, EndpointKind::Interrupt, 8)]),
            interface(
                1,
                vec![
                    EndpointInfo::new(COMMAND_IN_ADDRESS, EndpointKind::Bulk, 64),
                    EndpointInfo::new(COMMAND_OUT_ADDRESS, EndpointKind::Bulk, 64),
                ],
            ),
            interface(2, vec![EndpointInfo::new(0x83, EndpointKind::Interrupt, 16)]),
            interface(
                3,
                vec![EndpointInfo::new(REPORT_IN_ADDRESS, EndpointKind::Interrupt, 64)],
            ),
        ],
    }
}

/// A connect-state response from the command endpoint
pub fn connect_response(status: u8) -> Frame {
    let mut frame = [0u8; FRAME_SIZE];
    frame[4] = protocol::CONNECT_RESPONSE_TAG;
    frame[9] = status;
    frame
}

/// A connect-state frame as it appears in the report stream
pub fn connect_report(status: u8) -> Frame {
    let mut frame = connect_response(status);
    frame[0] = 0x26;
    frame[2] = 0x38;
    frame
}

/// An unrelated report-stream frame (key input and the like)
pub fn noise_report(fill: u8) -> Frame {
    let mut frame = [fill; FRAME_SIZE];
    frame[0] = 0x01;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{ConnectVerdict, decode_connect_state, is_connect_report};

    #[test]
    fn test_frames_decode_as_labelled() {
        assert_eq!(
            decode_connect_state(&connect_response(STATUS_CONNECTED)),
            ConnectVerdict::Connected
        );
        assert_eq!(
            decode_connect_state(&connect_report(STATUS_DISCONNECTED)),
            ConnectVerdict::Disconnected
        );
        assert!(is_connect_report(&connect_report(STATUS_CONNECTED)));
        assert!(!is_connect_report(&noise_report(0xA2)));
    }
}
