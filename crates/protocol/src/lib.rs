//! Wire protocol for the keyboard accessory
//!
//! This crate defines the small command protocol spoken by the keyboard
//! peripheral over its vendor bulk/interrupt endpoints: the connect-state
//! query frame, the decoding of its 64-byte response, and recognition of
//! connect-state frames embedded in the interrupt report stream.
//!
//! Everything here is pure: no I/O, no shared state.
//!
//! # Example
//!
//! ```
//! use protocol::{ConnectVerdict, FRAME_SIZE, build_connect_query, decode_connect_state};
//!
//! let query = build_connect_query();
//! assert_eq!(query[7], 0xDA);
//!
//! let mut response = [0u8; FRAME_SIZE];
//! response[4] = 0xA2;
//! response[9] = 0x23;
//! assert_eq!(decode_connect_state(&response), ConnectVerdict::Connected);
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{
    CONNECT_QUERY_HEADER, CONNECT_QUERY_LEN, CONNECT_RESPONSE_TAG, FRAME_SIZE, Frame,
    build_connect_query, checksum, decode_connect_state, is_connect_report, write_connect_query,
};
pub use error::{ProtocolAnomaly, ProtocolError, Result};
pub use types::{ConnectVerdict, ConnectionState, KEYBOARD_IDENTITY, PeripheralIdentity};
