//! USB descriptor model
//!
//! A backend-neutral snapshot of a device's configuration descriptor. The
//! endpoint resolver works only on these types, so it can be exercised
//! without hardware.

/// Endpoint direction, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host (address bit 7 set)
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Direction encoded in an endpoint address
    pub fn from_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// A single endpoint descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointInfo {
    /// Endpoint address including the direction bit
    pub address: u8,
    pub direction: Direction,
    pub kind: EndpointKind,
    pub max_packet_size: u16,
}

impl EndpointInfo {
    pub fn new(address: u8, kind: EndpointKind, max_packet_size: u16) -> Self {
        Self {
            address,
            direction: Direction::from_address(address),
            kind,
            max_packet_size,
        }
    }
}

/// One interface (alternate setting) of a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// bInterfaceNumber
    pub number: u8,
    /// bAlternateSetting
    pub alternate_setting: u8,
    pub class_code: u8,
    pub endpoints: Vec<EndpointInfo>,
}

/// A configuration descriptor with its interfaces in descriptor order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationInfo {
    pub number: u8,
    pub interfaces: Vec<InterfaceInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_direction() {
        // Bit 7 = 1 means IN endpoint
        assert_eq!(Direction::from_address(0x81), Direction::In);
        // Bit 7 = 0 means OUT endpoint
        assert_eq!(Direction::from_address(0x01), Direction::Out);
    }

    #[test]
    fn test_endpoint_new_derives_direction() {
        let ep = EndpointInfo::new(0x83, EndpointKind::Interrupt, 64);
        assert_eq!(ep.direction, Direction::In);
        assert_eq!(ep.kind, EndpointKind::Interrupt);
    }
}
