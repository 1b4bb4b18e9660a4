//! chargekeeper-hw — hardware bindings for charge control.
//!
//! Two independent edges of the system live here:
//!
//! ```text
//! switch.rs   — ChargeSwitch trait + sysfs charge_behaviour implementation
//! battery.rs  — battery telemetry reader + polling task
//! ```
//!
//! Both are driven by `/sys/class/power_supply` on Linux. The sysfs root is
//! a constructor parameter so tests can point at a tempdir fixture.

pub mod battery;
pub mod switch;

pub use battery::{BatteryReader, spawn_battery_poller};
pub use switch::{ChargeSwitch, HwError, MockSwitch, SysfsChargeSwitch};

/// Default sysfs root for power supply class devices.
pub const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";
