//! chargekeeper-core — domain types and the charge hysteresis policy.
//!
//! The policy lives here as a pure function over `(ChargeConfig, level,
//! hysteresis memory)` so it can be tested without hardware, a store, or a
//! runtime. Everything stateful (the control queue, the worker, the settle
//! timer) lives in `chargekeeper-controller`.

pub mod error;
pub mod policy;
pub mod types;

pub use error::{ChargeError, ChargeResult};
pub use policy::{Decision, evaluate};
pub use types::{BatterySnapshot, ChargeConfig, PlugSource};
