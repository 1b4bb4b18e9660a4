//! Control queue events.

use tokio::sync::oneshot;

use chargekeeper_core::{BatterySnapshot, ChargeResult};
use chargekeeper_store::SettingKey;

/// Everything the worker reacts to, in arrival order.
#[derive(Debug)]
pub enum ControlEvent {
    /// A settings key changed in the store; reload just that key.
    ConfigChanged(SettingKey),
    /// Fresh battery telemetry.
    Battery(BatterySnapshot),
    /// A validated command-interface write.
    Command(CommandRequest),
    /// A deferred USB plug transition has settled. Stale generations (the
    /// device was unplugged again in the meantime) are dropped.
    PlugSettled { generation: u64 },
}

/// A write submitted through the command interface.
#[derive(Debug)]
pub struct CommandRequest {
    pub kind: CommandKind,
    /// Acked only after the write is persisted and reflected in cached state.
    pub ack: oneshot::Sender<ChargeResult<()>>,
}

/// The write being requested. Range validation happens at the handle
/// boundary; the worker only sees in-range values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SetCeiling(u8),
    SetFloor(u8),
    SetEnabled(bool),
}
