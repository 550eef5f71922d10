//! Device session
//!
//! Caches the matched keyboard, its open connection and the resolved
//! endpoint sets. Readiness is established lazily and re-checked on every
//! call:
//!
//! ```text
//! NoDevice -> DeviceFound -> CommandReady
//!                        \-> ReportReady
//! ```
//!
//! The two ready states are independent; both hang off the same device and
//! connection. All cached fields live behind a single lock so discovery,
//! resolution and transfers never interleave.

use crate::engine::timer::DiscoveryTimer;
use crate::usb::endpoints::{
    CommandEndpoints, ReportEndpoint, resolve_command_endpoints, resolve_report_endpoint,
};
use crate::usb::host::{UsbConnection, UsbHost, UsbPeripheral};
use protocol::PeripheralIdentity;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Which endpoint a transfer goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Bulk OUT of the command interface
    CommandOut,
    /// Bulk IN of the command interface
    CommandIn,
    /// Interrupt IN of the report interface
    ReportIn,
}

struct SessionState<D: UsbPeripheral> {
    device: Option<D>,
    connection: Option<D::Connection>,
    command: Option<CommandEndpoints>,
    report: Option<ReportEndpoint>,
}

impl<D: UsbPeripheral> Default for SessionState<D> {
    fn default() -> Self {
        Self {
            device: None,
            connection: None,
            command: None,
            report: None,
        }
    }
}

pub struct DeviceSession<H: UsbHost> {
    host: H,
    identity: PeripheralIdentity,
    transfer_timeout: Duration,
    timer: DiscoveryTimer,
    state: Mutex<SessionState<H::Device>>,
}

impl<H: UsbHost> DeviceSession<H> {
    pub fn new(
        host: H,
        identity: PeripheralIdentity,
        transfer_timeout: Duration,
        timer: DiscoveryTimer,
    ) -> Self {
        Self {
            host,
            identity,
            transfer_timeout,
            timer,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn timer(&self) -> &DiscoveryTimer {
        &self.timer
    }

    /// Node name of the cached device, if any
    pub fn device_name(&self) -> Option<String> {
        self.state.lock().unwrap().device.as_ref().map(|d| d.name())
    }

    /// Make sure a keyboard is cached, enumerating if needed
    ///
    /// A failed lookup arms the discovery timer (once); a successful one
    /// cancels it.
    pub fn ensure_device(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.ensure_device_locked(&mut state)
    }

    fn ensure_device_locked(&self, state: &mut SessionState<H::Device>) -> bool {
        if state.device.is_none() {
            state.device = self.find_device();
        }

        if state.device.is_some() {
            self.timer.cancel();
            true
        } else {
            info!("Keyboard {} not found", self.identity);
            self.timer.arm();
            false
        }
    }

    fn find_device(&self) -> Option<H::Device> {
        let devices = match self.host.attached_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate USB devices: {}", e);
                return None;
            }
        };

        for device in devices {
            let identity = device.identity();
            if !self.identity.matches(identity.vendor_id, identity.product_id) {
                continue;
            }
            if !device.has_permission() {
                debug!("No permission for {} ({})", device.name(), identity);
                continue;
            }
            info!("Found keyboard at {}", device.name());
            return Some(device);
        }

        None
    }

    /// Make the command endpoints usable: device found, endpoints resolved,
    /// connection open and command interface claimed
    pub fn ensure_command_ready(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if state.device.is_some() {
            if let (Some(connection), Some(command)) = (state.connection.as_mut(), state.command)
            {
                claim(connection, command.interface);
                return true;
            }
        } else if !self.ensure_device_locked(state) {
            return false;
        }

        let Some(device) = state.device.as_ref() else {
            return false;
        };

        let command = match device.configuration() {
            Ok(config) => resolve_command_endpoints(&config),
            Err(e) => {
                warn!("Failed to read configuration of {}: {}", device.name(), e);
                None
            }
        };
        let Some(command) = command else {
            info!("No command endpoints on {}", device.name());
            return false;
        };
        state.command = Some(command);

        if state.connection.is_none() {
            state.connection = open(device);
        }

        match state.connection.as_mut() {
            Some(connection) => {
                claim(connection, command.interface);
                debug!(
                    "Command endpoints ready: interface {}, in {:#04x}, out {:#04x}",
                    command.interface, command.input.address, command.output.address
                );
                true
            }
            None => {
                info!("No connection for command transfers");
                false
            }
        }
    }

    /// Make the report endpoint usable: device found, endpoint resolved,
    /// connection open and report interface claimed
    pub fn ensure_report_ready(&self) -> bool {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if state.device.is_some() {
            if let (Some(connection), Some(report)) = (state.connection.as_mut(), state.report) {
                claim(connection, report.interface);
                return true;
            }
        } else if !self.ensure_device_locked(state) {
            return false;
        }

        let Some(device) = state.device.as_ref() else {
            return false;
        };

        let report = match device.configuration() {
            Ok(config) => resolve_report_endpoint(&config),
            Err(e) => {
                warn!("Failed to read configuration of {}: {}", device.name(), e);
                None
            }
        };
        let Some(report) = report else {
            warn!("No report endpoint on {}", device.name());
            return false;
        };
        state.report = Some(report);

        if state.connection.is_none() {
            state.connection = open(device);
        }

        match state.connection.as_mut() {
            Some(connection) => {
                claim(connection, report.interface);
                debug!(
                    "Report endpoint ready: interface {}, in {:#04x}",
                    report.interface, report.input.address
                );
                true
            }
            None => {
                warn!("No connection for report transfers");
                false
            }
        }
    }

    /// Run one bounded transfer on `channel`
    ///
    /// Returns false if the channel is not ready, `buf` is empty, or the
    /// transfer fails or times out. A vanished device drops the whole
    /// session so the next readiness check starts from discovery.
    pub fn transfer(&self, channel: Channel, buf: &mut [u8]) -> bool {
        if buf.is_empty() {
            return false;
        }

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let endpoint = match channel {
            Channel::CommandOut => state.command.map(|c| c.output),
            Channel::CommandIn => state.command.map(|c| c.input),
            Channel::ReportIn => state.report.map(|r| r.input),
        };
        let (Some(endpoint), Some(connection)) = (endpoint, state.connection.as_mut()) else {
            return false;
        };

        match connection.transfer(&endpoint, buf, self.transfer_timeout) {
            Ok(len) => {
                trace!(
                    "{:?} transfer on {:#04x}: {} bytes",
                    channel, endpoint.address, len
                );
                true
            }
            Err(rusb::Error::Timeout) => {
                trace!("{:?} transfer on {:#04x} timed out", channel, endpoint.address);
                false
            }
            Err(rusb::Error::NoDevice) => {
                warn!("Keyboard disappeared, dropping USB session");
                *state = SessionState::default();
                false
            }
            Err(e) => {
                debug!(
                    "{:?} transfer on {:#04x} failed: {}",
                    channel, endpoint.address, e
                );
                false
            }
        }
    }

    /// Forget the cached device, connection and endpoints
    pub fn invalidate(&self) {
        *self.state.lock().unwrap() = SessionState::default();
    }
}

fn open<D: UsbPeripheral>(device: &D) -> Option<D::Connection> {
    match device.open() {
        Ok(connection) => Some(connection),
        Err(e) => {
            warn!("Failed to open {}: {}", device.name(), e);
            None
        }
    }
}

fn claim<C: UsbConnection>(connection: &mut C, interface: u8) {
    if let Err(e) = connection.claim_interface(interface, true) {
        warn!("Failed to claim interface {}: {}", interface, e);
    }
}
