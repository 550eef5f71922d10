//! Scripted USB host for tests
//!
//! Devices are attached to a shared [`MockHost`]; reads pop frames queued per
//! endpoint address (an empty queue times out) and writes are recorded.

use crate::usb::host::{UsbConnection, UsbHost, UsbPeripheral};
use common::test_utils::keyboard_configuration;
use common::{ConfigurationInfo, Direction, EndpointInfo};
use protocol::{Frame, KEYBOARD_IDENTITY, PeripheralIdentity};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    devices: Vec<MockDevice>,
    reads: HashMap<u8, VecDeque<Result<Frame, rusb::Error>>>,
    write_errors: HashMap<u8, VecDeque<rusb::Error>>,
    writes: Vec<(u8, Vec<u8>)>,
    read_attempts: HashMap<u8, usize>,
    claims: Vec<u8>,
    opens: usize,
    enumerations: usize,
}

#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, mut device: MockDevice) {
        device.state = Some(self.state.clone());
        self.state.lock().unwrap().devices.push(device);
    }

    pub fn detach_all(&self) {
        self.state.lock().unwrap().devices.clear();
    }

    pub fn queue_read(&self, address: u8, frame: Frame) {
        self.state
            .lock()
            .unwrap()
            .reads
            .entry(address)
            .or_default()
            .push_back(Ok(frame));
    }

    pub fn queue_read_error(&self, address: u8, error: rusb::Error) {
        self.state
            .lock()
            .unwrap()
            .reads
            .entry(address)
            .or_default()
            .push_back(Err(error));
    }

    pub fn fail_next_write(&self, address: u8, error: rusb::Error) {
        self.state
            .lock()
            .unwrap()
            .write_errors
            .entry(address)
            .or_default()
            .push_back(error);
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn read_attempts(&self, address: u8) -> usize {
        self.state
            .lock()
            .unwrap()
            .read_attempts
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    pub fn pending_reads(&self, address: u8) -> usize {
        self.state
            .lock()
            .unwrap()
            .reads
            .get(&address)
            .map_or(0, VecDeque::len)
    }

    pub fn claims(&self) -> Vec<u8> {
        self.state.lock().unwrap().claims.clone()
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn enumerations(&self) -> usize {
        self.state.lock().unwrap().enumerations
    }
}

impl UsbHost for MockHost {
    type Device = MockDevice;

    fn attached_devices(&self) -> Result<Vec<MockDevice>, rusb::Error> {
        let mut state = self.state.lock().unwrap();
        state.enumerations += 1;
        Ok(state.devices.clone())
    }
}

#[derive(Clone)]
pub struct MockDevice {
    identity: PeripheralIdentity,
    name: String,
    permission: bool,
    configuration: ConfigurationInfo,
    open_error: Option<rusb::Error>,
    state: Option<Arc<Mutex<MockState>>>,
}

impl MockDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            identity: PeripheralIdentity {
                vendor_id,
                product_id,
            },
            name: "/dev/bus/usb/001/002".to_string(),
            permission: true,
            configuration: keyboard_configuration(),
            open_error: None,
            state: None,
        }
    }

    pub fn keyboard() -> Self {
        Self::new(KEYBOARD_IDENTITY.vendor_id, KEYBOARD_IDENTITY.product_id)
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn without_permission(mut self) -> Self {
        self.permission = false;
        self
    }

    pub fn with_configuration(mut self, configuration: ConfigurationInfo) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn failing_open(mut self, error: rusb::Error) -> Self {
        self.open_error = Some(error);
        self
    }
}

impl UsbPeripheral for MockDevice {
    type Connection = MockConnection;

    fn identity(&self) -> PeripheralIdentity {
        self.identity
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn has_permission(&self) -> bool {
        self.permission
    }

    fn configuration(&self) -> Result<ConfigurationInfo, rusb::Error> {
        Ok(self.configuration.clone())
    }

    fn open(&self) -> Result<MockConnection, rusb::Error> {
        if let Some(e) = self.open_error {
            return Err(e);
        }
        let state = self.state.clone().ok_or(rusb::Error::NoDevice)?;
        state.lock().unwrap().opens += 1;
        Ok(MockConnection { state })
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl UsbConnection for MockConnection {
    fn claim_interface(&mut self, number: u8, _force: bool) -> Result<(), rusb::Error> {
        self.state.lock().unwrap().claims.push(number);
        Ok(())
    }

    fn transfer(
        &mut self,
        endpoint: &EndpointInfo,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        let mut state = self.state.lock().unwrap();
        let address = endpoint.address;

        match endpoint.direction {
            Direction::Out => {
                if let Some(e) = state.write_errors.get_mut(&address).and_then(VecDeque::pop_front) {
                    return Err(e);
                }
                state.writes.push((address, buf.to_vec()));
                Ok(buf.len())
            }
            Direction::In => {
                *state.read_attempts.entry(address).or_default() += 1;
                match state.reads.get_mut(&address).and_then(VecDeque::pop_front) {
                    Some(Ok(frame)) => {
                        let len = buf.len().min(frame.len());
                        buf[..len].copy_from_slice(&frame[..len]);
                        Ok(len)
                    }
                    Some(Err(e)) => Err(e),
                    None => Err(rusb::Error::Timeout),
                }
            }
        }
    }
}
