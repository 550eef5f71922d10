//! Frame codec
//!
//! Request side: an 8-byte connect-state query (7 header bytes plus an
//! additive checksum), carried in a zero-padded 64-byte transfer buffer.
//!
//! Response side: a 64-byte frame whose byte 4 tags it as a connect-state
//! response and whose bytes 9 and 18 carry the status bits. The same frame
//! layout can show up inside the interrupt report stream, prefixed by the
//! report header `26 ?? 38 ?? A2`.

use crate::error::{ProtocolAnomaly, ProtocolError, Result};
use crate::types::ConnectVerdict;

/// Size of every transfer buffer exchanged with the keyboard
pub const FRAME_SIZE: usize = 64;

/// A full transfer buffer
pub type Frame = [u8; FRAME_SIZE];

/// Fixed header of the connect-state query (magic, command, sequence)
pub const CONNECT_QUERY_HEADER: [u8; 7] = [0x4E, 0x31, 0x80, 0x38, 0xA1, 0x01, 0x01];

/// Length of the query including its checksum byte
pub const CONNECT_QUERY_LEN: usize = CONNECT_QUERY_HEADER.len() + 1;

/// Byte 4 of a connect-state response
pub const CONNECT_RESPONSE_TAG: u8 = 0xA2;

const TAG_OFFSET: usize = 4;
const STATUS_OFFSET: usize = 9;
const CHARGE_OFFSET: usize = 18;

const REPORT_ID: u8 = 0x26;
const REPORT_ID_OFFSET: usize = 0;
const REPORT_CLASS: u8 = 0x38;
const REPORT_CLASS_OFFSET: usize = 2;

// Status byte masks. Low two bits carry the link check, bits 5/6 the pin check.
const LINK_MASK: u8 = 0x03;
const PIN_MASK: u8 = 0x63;

/// 8-bit wrapping sum of `data`
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Build the 8-byte connect-state query
pub fn build_connect_query() -> [u8; CONNECT_QUERY_LEN] {
    let mut query = [0u8; CONNECT_QUERY_LEN];
    query[..CONNECT_QUERY_HEADER.len()].copy_from_slice(&CONNECT_QUERY_HEADER);
    query[CONNECT_QUERY_HEADER.len()] = checksum(&CONNECT_QUERY_HEADER);
    query
}

/// Zero `buf` and place the connect-state query at its start
pub fn write_connect_query(buf: &mut [u8]) -> Result<()> {
    if buf.len() < CONNECT_QUERY_LEN {
        return Err(ProtocolError::BufferTooSmall {
            needed: CONNECT_QUERY_LEN,
            available: buf.len(),
        });
    }

    buf.fill(0);
    buf[..CONNECT_QUERY_LEN].copy_from_slice(&build_connect_query());
    Ok(())
}

/// Decode a connect-state response
///
/// Only bytes 4, 9 and 18 are inspected. The checks run in a fixed order:
/// the pin mask overlaps the link mask, so a frame that fails the pin check
/// must be rejected before the link bits are read as a verdict.
pub fn decode_connect_state(frame: &Frame) -> ConnectVerdict {
    let tag = frame[TAG_OFFSET];
    if tag != CONNECT_RESPONSE_TAG {
        return ConnectVerdict::Inconclusive(ProtocolAnomaly::UnexpectedTag(tag));
    }

    let status = frame[STATUS_OFFSET];

    if frame[CHARGE_OFFSET] == 1 {
        ConnectVerdict::Inconclusive(ProtocolAnomaly::OverCharged)
    } else if status & LINK_MASK == 0x01 {
        ConnectVerdict::Inconclusive(ProtocolAnomaly::TrxCheckFailed)
    } else if status & PIN_MASK == 0x43 {
        ConnectVerdict::Inconclusive(ProtocolAnomaly::PinConnectFailed)
    } else if status & LINK_MASK == 0x00 {
        ConnectVerdict::Disconnected
    } else if status & PIN_MASK == 0x23 {
        ConnectVerdict::Connected
    } else {
        ConnectVerdict::Inconclusive(ProtocolAnomaly::Unrecognized(status))
    }
}

/// Whether a report-stream frame embeds a connect-state response
pub fn is_connect_report(frame: &[u8]) -> bool {
    frame.len() > TAG_OFFSET
        && frame[REPORT_ID_OFFSET] == REPORT_ID
        && frame[REPORT_CLASS_OFFSET] == REPORT_CLASS
        && frame[TAG_OFFSET] == CONNECT_RESPONSE_TAG
}
