//! Common utilities for kbd-manager
//!
//! This crate provides functionality shared by the manager and its tests:
//! error handling, logging setup, the USB descriptor model, and the work
//! queue that feeds the single engine worker thread.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod usb_types;

pub use channel::{
    ENGINE_QUEUE_CAPACITY, EngineInbox, EngineMessage, EnginePoster, create_engine_queue,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{ConfigurationInfo, Direction, EndpointInfo, EndpointKind, InterfaceInfo};
