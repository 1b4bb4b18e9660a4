//! ControllerHandle — the command interface over the control loop.
//!
//! Reads never fail: they come from watch snapshots that only the worker
//! writes. Writes are validated here (out-of-range values never reach the
//! worker or the store), then queued and acked once applied.

use tokio::sync::{mpsc, oneshot, watch};

use chargekeeper_core::{BatterySnapshot, ChargeConfig, ChargeError, ChargeResult};

use crate::event::{CommandKind, CommandRequest, ControlEvent};

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    events: mpsc::Sender<ControlEvent>,
    config_rx: watch::Receiver<ChargeConfig>,
    battery_rx: watch::Receiver<BatterySnapshot>,
}

impl ControllerHandle {
    pub(crate) fn new(
        events: mpsc::Sender<ControlEvent>,
        config_rx: watch::Receiver<ChargeConfig>,
        battery_rx: watch::Receiver<BatterySnapshot>,
    ) -> Self {
        Self {
            events,
            config_rx,
            battery_rx,
        }
    }

    /// Current cached config. Consistent snapshot; never fails.
    pub fn config(&self) -> ChargeConfig {
        *self.config_rx.borrow()
    }

    pub fn ceiling(&self) -> u8 {
        self.config_rx.borrow().ceiling
    }

    pub fn floor(&self) -> u8 {
        self.config_rx.borrow().floor
    }

    pub fn enabled(&self) -> bool {
        self.config_rx.borrow().feature_enabled
    }

    /// Battery state as accepted by the controller.
    pub fn battery(&self) -> BatterySnapshot {
        *self.battery_rx.borrow()
    }

    /// Set the charge ceiling. Validates `0..=100` before touching the queue.
    pub async fn set_ceiling(&self, level: i64) -> ChargeResult<()> {
        let level = validate_percent(level)?;
        self.submit(CommandKind::SetCeiling(level)).await
    }

    /// Set the charge floor. Validates `0..=100` before touching the queue.
    pub async fn set_floor(&self, level: i64) -> ChargeResult<()> {
        let level = validate_percent(level)?;
        self.submit(CommandKind::SetFloor(level)).await
    }

    /// Toggle the feature.
    pub async fn set_enabled(&self, enabled: bool) -> ChargeResult<()> {
        self.submit(CommandKind::SetEnabled(enabled)).await
    }

    /// Enqueue a raw control event (used by the settings watcher and the
    /// telemetry forwarder).
    pub async fn push_event(
        &self,
        event: ControlEvent,
    ) -> Result<(), mpsc::error::SendError<ControlEvent>> {
        self.events.send(event).await
    }

    /// Enqueue a battery telemetry snapshot.
    pub async fn push_battery(
        &self,
        snapshot: BatterySnapshot,
    ) -> Result<(), mpsc::error::SendError<ControlEvent>> {
        self.push_event(ControlEvent::Battery(snapshot)).await
    }

    /// Wait until the worker publishes a new battery snapshot.
    pub async fn battery_changed(&mut self) {
        let _ = self.battery_rx.changed().await;
    }

    async fn submit(&self, kind: CommandKind) -> ChargeResult<()> {
        let (ack, done) = oneshot::channel();
        self.events
            .send(ControlEvent::Command(CommandRequest { kind, ack }))
            .await
            .map_err(|_| ChargeError::StoreUnavailable("controller stopped".to_string()))?;
        done.await
            .map_err(|_| ChargeError::StoreUnavailable("controller stopped".to_string()))?
    }
}

fn validate_percent(level: i64) -> Result<u8, ChargeError> {
    if (0..=100).contains(&level) {
        Ok(level as u8)
    } else {
        Err(ChargeError::OutOfRange(level))
    }
}
