//! The charge switch — the interface that actually stops and starts current
//! flow into the battery.
//!
//! On Linux this drives the `charge_behaviour` sysfs attribute: `auto` lets
//! the charger run normally, `inhibit-charge` suspends charging while staying
//! on external power. `detect()` probes for a battery node exposing the
//! attribute; absence means the feature is unsupported on this device.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};

/// Errors from the charge switch.
#[derive(Debug, Error)]
pub enum HwError {
    #[error("failed to read charge state: {0}")]
    Read(String),

    #[error("failed to write charge state: {0}")]
    Write(String),

    #[error("unexpected charge_behaviour value: {0:?}")]
    Unparseable(String),
}

/// Abstraction over the physical charge-control interface.
///
/// Calls are synchronous and bounded (plain sysfs file I/O); they may fail
/// but never block indefinitely.
pub trait ChargeSwitch: Send + Sync {
    /// Whether the charger is currently allowed to charge the battery.
    fn get_charge_enabled(&self) -> Result<bool, HwError>;

    /// Allow or inhibit charging.
    fn set_charge_enabled(&self, enabled: bool) -> Result<(), HwError>;
}

/// Charge switch backed by `<battery>/charge_behaviour`.
pub struct SysfsChargeSwitch {
    behaviour_path: PathBuf,
}

impl SysfsChargeSwitch {
    /// Bind to a specific battery directory (e.g. `/sys/class/power_supply/BAT0`).
    pub fn new(battery_dir: &Path) -> Self {
        Self {
            behaviour_path: battery_dir.join("charge_behaviour"),
        }
    }

    /// Probe the power-supply root for a battery exposing `charge_behaviour`.
    ///
    /// Returns `None` when no such node exists, which marks the feature
    /// unsupported for the daemon and the API.
    pub fn detect(root: &Path) -> Option<Self> {
        let entries = fs::read_dir(root).ok()?;
        for entry in entries.flatten() {
            let dir = entry.path();
            let type_file = dir.join("type");
            let Ok(kind) = fs::read_to_string(&type_file) else {
                continue;
            };
            if kind.trim() != "Battery" {
                continue;
            }
            if dir.join("charge_behaviour").exists() {
                info!(battery = %dir.display(), "charge switch detected");
                return Some(Self::new(&dir));
            }
        }
        debug!(root = %root.display(), "no charge-capable battery found");
        None
    }
}

impl ChargeSwitch for SysfsChargeSwitch {
    fn get_charge_enabled(&self) -> Result<bool, HwError> {
        let raw =
            fs::read_to_string(&self.behaviour_path).map_err(|e| HwError::Read(e.to_string()))?;
        // The kernel reports the active value in brackets, e.g.
        // "[auto] inhibit-charge force-discharge".
        if raw.contains("[auto]") {
            Ok(true)
        } else if raw.contains("[inhibit-charge]") || raw.contains("[force-discharge]") {
            Ok(false)
        } else {
            // Single-value files (no selection brackets).
            match raw.trim() {
                "auto" => Ok(true),
                "inhibit-charge" | "force-discharge" => Ok(false),
                other => Err(HwError::Unparseable(other.to_string())),
            }
        }
    }

    fn set_charge_enabled(&self, enabled: bool) -> Result<(), HwError> {
        let value = if enabled { "auto" } else { "inhibit-charge" };
        fs::write(&self.behaviour_path, value).map_err(|e| HwError::Write(e.to_string()))?;
        debug!(value, "charge behaviour written");
        Ok(())
    }
}

/// In-memory charge switch for tests: records every command and can inject
/// failures on either direction.
#[derive(Default)]
pub struct MockSwitch {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    enabled: bool,
    commands: Vec<bool>,
    fail_get: bool,
    fail_set: bool,
}

impl MockSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Mutex::new(MockState {
                enabled,
                ..MockState::default()
            }),
        }
    }

    /// Every `set_charge_enabled` argument seen so far, in order.
    pub fn commands(&self) -> Vec<bool> {
        self.inner.lock().unwrap().commands.clone()
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.inner.lock().unwrap().fail_get = fail;
    }

    pub fn set_fail_set(&self, fail: bool) {
        self.inner.lock().unwrap().fail_set = fail;
    }
}

impl ChargeSwitch for MockSwitch {
    fn get_charge_enabled(&self) -> Result<bool, HwError> {
        let state = self.inner.lock().unwrap();
        if state.fail_get {
            return Err(HwError::Read("injected".to_string()));
        }
        Ok(state.enabled)
    }

    fn set_charge_enabled(&self, enabled: bool) -> Result<(), HwError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_set {
            return Err(HwError::Write("injected".to_string()));
        }
        state.enabled = enabled;
        state.commands.push(enabled);
        Ok(())
    }
}
