//! USB subsystem
//!
//! Finds the keyboard, resolves its command and report endpoints and runs
//! bounded transfers on them.
//!
//! All USB I/O happens on the engine worker thread; the session lock only
//! guards against the occasional caller probing from elsewhere (listing,
//! one-shot probes).

pub mod device;
pub mod endpoints;
pub mod host;
#[cfg(test)]
pub mod mock;
pub mod session;

pub use device::RusbHost;
pub use host::{UsbHost, UsbPeripheral};
pub use session::{Channel, DeviceSession};
