//! USB host abstraction
//!
//! The session only needs a handful of host operations: enumerate attached
//! devices, inspect their identity and first configuration, open them, claim
//! interfaces and run timed transfers. These traits capture exactly that so
//! the engine can run against `rusb` in production and a scripted host in
//! tests.

use common::{ConfigurationInfo, EndpointInfo};
use protocol::PeripheralIdentity;
use std::time::Duration;

/// Enumerates attached USB devices
pub trait UsbHost: Send + Sync + 'static {
    type Device: UsbPeripheral;

    /// Snapshot of the devices currently attached to the host
    fn attached_devices(&self) -> Result<Vec<Self::Device>, rusb::Error>;
}

/// An attached (not necessarily opened) USB device
pub trait UsbPeripheral: Send + 'static {
    type Connection: UsbConnection;

    /// Vendor/product identity from the device descriptor
    fn identity(&self) -> PeripheralIdentity;

    /// Human-readable node name, e.g. `/dev/bus/usb/001/004`
    fn name(&self) -> String;

    /// Whether this process may open the device
    fn has_permission(&self) -> bool;

    /// Descriptor of the first configuration
    fn configuration(&self) -> Result<ConfigurationInfo, rusb::Error>;

    /// Open a connection to the device
    fn open(&self) -> Result<Self::Connection, rusb::Error>;
}

/// An open connection to a device
pub trait UsbConnection: Send + 'static {
    /// Claim an interface; with `force`, detach any kernel driver first.
    /// Claiming an interface that is already claimed succeeds.
    fn claim_interface(&mut self, number: u8, force: bool) -> Result<(), rusb::Error>;

    /// Run one transfer on `endpoint`, reading into or writing from `buf`
    /// depending on its direction. Returns the number of bytes moved.
    fn transfer(
        &mut self,
        endpoint: &EndpointInfo,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;
}
