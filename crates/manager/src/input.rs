//! Input device enablement
//!
//! Keyboard events reach applications through the kernel input subsystem.
//! [`InputInhibitor`] follows the connection state: the matching input
//! devices are inhibited while the keyboard is undocked and released once
//! it reports connected.

use crate::state::KeyboardStateListener;
use protocol::{ConnectionState, PeripheralIdentity};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// An input device as seen under `/sys/class/input`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    /// Node name, e.g. `input7`
    pub id: String,
    pub name: String,
    pub identity: PeripheralIdentity,
    /// `None` when the kernel does not support inhibiting this device
    pub inhibited: Option<bool>,
    path: PathBuf,
}

impl InputDeviceInfo {
    pub fn is_enabled(&self) -> bool {
        self.inhibited != Some(true)
    }
}

/// List input devices under `class_dir`, sorted by node name
pub fn list_input_devices(class_dir: &Path) -> io::Result<Vec<InputDeviceInfo>> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir(class_dir)? {
        let entry = entry?;
        let id = entry.file_name().to_string_lossy().into_owned();
        if !id.starts_with("input") {
            continue;
        }

        let path = entry.path();
        let Some(identity) = read_identity(&path) else {
            debug!("Skipping {} without id attributes", path.display());
            continue;
        };

        devices.push(InputDeviceInfo {
            id,
            name: read_attr(&path.join("name")).unwrap_or_default(),
            identity,
            inhibited: read_attr(&path.join("inhibited")).map(|v| v == "1"),
            path,
        });
    }

    devices.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(devices)
}

fn read_attr(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}

fn read_identity(device: &Path) -> Option<PeripheralIdentity> {
    let parse = |attr: &str| {
        read_attr(&device.join("id").join(attr))
            .and_then(|v| u16::from_str_radix(&v, 16).ok())
    };

    Some(PeripheralIdentity {
        vendor_id: parse("vendor")?,
        product_id: parse("product")?,
    })
}

/// Toggles the input devices belonging to one peripheral
pub struct InputInhibitor {
    class_dir: PathBuf,
    identity: PeripheralIdentity,
}

impl InputInhibitor {
    pub fn new(class_dir: impl Into<PathBuf>, identity: PeripheralIdentity) -> Self {
        Self {
            class_dir: class_dir.into(),
            identity,
        }
    }

    /// Enable or disable every matching input device
    ///
    /// Returns how many devices were updated.
    pub fn set_enabled(&self, enabled: bool) -> usize {
        let devices = match list_input_devices(&self.class_dir) {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    "Failed to list input devices in {}: {}",
                    self.class_dir.display(),
                    e
                );
                return 0;
            }
        };

        let value = if enabled { "0" } else { "1" };
        let mut updated = 0;

        for device in devices.iter().filter(|d| {
            self.identity
                .matches(d.identity.vendor_id, d.identity.product_id)
        }) {
            let attr = device.path.join("inhibited");
            match std::fs::write(&attr, value) {
                Ok(()) => {
                    info!(
                        "{} input device {} ({})",
                        if enabled { "Enabled" } else { "Disabled" },
                        device.id,
                        device.name
                    );
                    updated += 1;
                }
                Err(e) => error!("Failed to write {}: {}", attr.display(), e),
            }
        }

        if updated == 0 {
            warn!("No input device found for {}", self.identity);
        }
        updated
    }

    pub fn enable_keyboard(&self) -> usize {
        self.set_enabled(true)
    }

    pub fn disable_keyboard(&self) -> usize {
        self.set_enabled(false)
    }
}

impl KeyboardStateListener for InputInhibitor {
    fn on_keyboard_state_changed(&self, state: ConnectionState) {
        info!("keyboard state = {}", state.as_raw());
        self.set_enabled(state.is_connected());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::KEYBOARD_IDENTITY;
    use tempfile::TempDir;

    fn add_device(root: &Path, id: &str, name: &str, vendor: &str, product: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(dir.join("id")).unwrap();
        std::fs::write(dir.join("name"), format!("{}\n", name)).unwrap();
        std::fs::write(dir.join("id/vendor"), format!("{}\n", vendor)).unwrap();
        std::fs::write(dir.join("id/product"), format!("{}\n", product)).unwrap();
        std::fs::write(dir.join("inhibited"), "0\n").unwrap();
        dir
    }

    #[test]
    fn test_list_input_devices() {
        let root = TempDir::new().unwrap();
        add_device(root.path(), "input3", "AT Keyboard", "0001", "0001");
        add_device(root.path(), "input12", "Pad Keyboard", "3206", "3ffc");
        std::fs::create_dir_all(root.path().join("event0")).unwrap();
        std::fs::create_dir_all(root.path().join("input99")).unwrap();

        let devices = list_input_devices(root.path()).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "input12");
        assert_eq!(devices[0].name, "Pad Keyboard");
        assert_eq!(devices[0].identity, KEYBOARD_IDENTITY);
        assert!(devices[0].is_enabled());
        assert_eq!(devices[1].id, "input3");
    }

    #[test]
    fn test_toggles_only_matching_devices() {
        let root = TempDir::new().unwrap();
        let other = add_device(root.path(), "input1", "Other", "046d", "c52b");
        let keyboard = add_device(root.path(), "input2", "Pad Keyboard", "3206", "3ffc");
        let keyboard_consumer =
            add_device(root.path(), "input3", "Pad Keyboard Consumer", "3206", "3ffc");

        let inhibitor = InputInhibitor::new(root.path(), KEYBOARD_IDENTITY);

        assert_eq!(inhibitor.disable_keyboard(), 2);
        assert_eq!(read_attr(&keyboard.join("inhibited")).unwrap(), "1");
        assert_eq!(read_attr(&keyboard_consumer.join("inhibited")).unwrap(), "1");
        assert_eq!(read_attr(&other.join("inhibited")).unwrap(), "0");

        inhibitor.on_keyboard_state_changed(ConnectionState::Connected);
        assert_eq!(read_attr(&keyboard.join("inhibited")).unwrap(), "0");

        inhibitor.on_keyboard_state_changed(ConnectionState::Disconnected);
        let devices = list_input_devices(root.path()).unwrap();
        assert!(!devices.iter().find(|d| d.id == "input2").unwrap().is_enabled());
    }

    #[test]
    fn test_missing_class_dir() {
        let root = TempDir::new().unwrap();
        let inhibitor = InputInhibitor::new(root.path().join("missing"), KEYBOARD_IDENTITY);
        assert_eq!(inhibitor.enable_keyboard(), 0);
        assert!(list_input_devices(&root.path().join("missing")).is_err());
    }
}
