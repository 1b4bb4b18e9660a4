//! The control worker — owns all mutable controller state.
//!
//! State (cached `ChargeConfig`, `BatterySnapshot`, hysteresis memory) is
//! mutated exclusively by this task, so the decision logic needs no locks.
//! Hardware failures are absorbed here: a failed charge-state query falls
//! open to "charging allowed", a failed command is logged and retried on the
//! next event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chargekeeper_core::types::{DEFAULT_CEILING, DEFAULT_FLOOR};
use chargekeeper_core::{BatterySnapshot, ChargeConfig, ChargeError, PlugSource, evaluate};
use chargekeeper_hw::ChargeSwitch;
use chargekeeper_store::{SettingKey, SettingsStore};

use crate::event::{CommandKind, CommandRequest, ControlEvent};
use crate::handle::ControllerHandle;

/// Depth of the control queue. Events are tiny and the worker is fast; this
/// only needs to absorb a burst of telemetry during a slow store write.
const QUEUE_CAPACITY: usize = 64;

/// Tunables for the controller worker.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Settle delay before trusting a USB plug-in signal. The USB power-path
    /// signal bounces on some hardware, so the plugged flag is deferred by
    /// this long (level and source still update immediately).
    pub usb_settle: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            usb_settle: Duration::from_secs(1),
        }
    }
}

/// Spawn the control worker.
///
/// Loads the persisted config, performs one full evaluation regardless of
/// plug state (so an already-plugged device assumes the correct state
/// immediately), then consumes the control queue until shutdown.
pub fn spawn_controller(
    store: SettingsStore,
    switch: Arc<dyn ChargeSwitch>,
    config: ControllerConfig,
    shutdown: watch::Receiver<bool>,
) -> (ControllerHandle, JoinHandle<()>) {
    let (events_tx, events_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (config_tx, config_rx) = watch::channel(ChargeConfig::default());
    let (battery_tx, battery_rx) = watch::channel(BatterySnapshot::default());

    let handle = ControllerHandle::new(events_tx.clone(), config_rx, battery_rx);

    let worker = Worker {
        store,
        switch,
        usb_settle: config.usb_settle,
        cached: ChargeConfig::default(),
        battery: BatterySnapshot::default(),
        telemetry_plugged: false,
        last_decision: false,
        plug_generation: 0,
        pending_plug: None,
        config_tx,
        battery_tx,
        events_tx,
    };

    let task = tokio::spawn(worker.run(events_rx, shutdown));
    (handle, task)
}

struct Worker {
    store: SettingsStore,
    switch: Arc<dyn ChargeSwitch>,
    usb_settle: Duration,

    /// Cached config, refreshed only via the control queue.
    cached: ChargeConfig,
    /// Battery state as accepted by the controller (plugged lags telemetry
    /// during the USB settle window).
    battery: BatterySnapshot,
    /// Plugged flag as last reported by telemetry, before settle deferral.
    telemetry_plugged: bool,
    /// Hysteresis memory. Starts false; rebuilt from defaults on restart.
    last_decision: bool,

    /// Bumped on every plug transition; invalidates in-flight settle timers.
    plug_generation: u64,
    /// Generation of the deferred USB plug-in currently waiting to settle.
    pending_plug: Option<u64>,

    config_tx: watch::Sender<ChargeConfig>,
    battery_tx: watch::Sender<BatterySnapshot>,
    events_tx: mpsc::Sender<ControlEvent>,
}

impl Worker {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<ControlEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.reload_all();
        let _ = self.config_tx.send(self.cached);
        info!(
            ceiling = self.cached.ceiling,
            floor = self.cached.floor,
            enabled = self.cached.feature_enabled,
            "controller started"
        );
        // Boot evaluation runs even while unplugged.
        self.evaluate_and_apply();

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(ControlEvent::ConfigChanged(key)) => self.on_config_changed(key),
                        Some(ControlEvent::Battery(snapshot)) => self.on_battery(snapshot),
                        Some(ControlEvent::Command(req)) => self.on_command(req),
                        Some(ControlEvent::PlugSettled { generation }) => {
                            self.on_plug_settled(generation)
                        }
                        None => {
                            debug!("control queue closed, worker exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }
    }

    /// Reload all three keys, falling back to defaults on store errors.
    fn reload_all(&mut self) {
        self.cached.ceiling = self.store.ceiling().unwrap_or_else(|e| {
            warn!(error = %e, "ceiling unreadable, using default");
            DEFAULT_CEILING
        });
        self.cached.floor = self.store.floor().unwrap_or_else(|e| {
            warn!(error = %e, "floor unreadable, using default");
            DEFAULT_FLOOR
        });
        self.cached.feature_enabled = self.store.enabled().unwrap_or_else(|e| {
            warn!(error = %e, "enabled flag unreadable, using default");
            false
        });
    }

    /// Reload exactly the changed key, then re-evaluate.
    fn on_config_changed(&mut self, key: SettingKey) {
        let result = match key {
            SettingKey::Ceiling => self.store.ceiling().map(|v| self.cached.ceiling = v),
            SettingKey::Floor => self.store.floor().map(|v| self.cached.floor = v),
            SettingKey::Enabled => self
                .store
                .enabled()
                .map(|v| self.cached.feature_enabled = v),
        };
        if let Err(e) = result {
            // Keep the cached value; durable and live config stay consistent
            // once the store recovers and re-notifies.
            warn!(key = key.name(), error = %e, "failed to reload setting");
            return;
        }
        let _ = self.config_tx.send(self.cached);
        self.evaluate_and_apply();
    }

    fn on_battery(&mut self, snapshot: BatterySnapshot) {
        let level_changed = snapshot.level_pct != self.battery.level_pct;
        // Compare against raw telemetry, not the accepted flag: an unplug
        // during the settle window must still cancel the pending plug-in.
        let plug_changed = snapshot.plugged != self.telemetry_plugged;

        // Level and source always update immediately.
        self.battery.level_pct = snapshot.level_pct;
        self.battery.source = snapshot.source;

        let mut should_evaluate = level_changed;

        if plug_changed {
            // Any transition invalidates an in-flight settle timer.
            self.plug_generation += 1;
            self.pending_plug = None;
            self.telemetry_plugged = snapshot.plugged;

            if snapshot.plugged && snapshot.source == PlugSource::Usb {
                // Absorb USB insertion bounce: defer the plugged update,
                // keep the worker free, and re-enqueue once settled.
                let generation = self.plug_generation;
                self.pending_plug = Some(generation);
                debug!(generation, delay = ?self.usb_settle, "usb plug-in, deferring");
                let events = self.events_tx.clone();
                let delay = self.usb_settle;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(ControlEvent::PlugSettled { generation }).await;
                });
            } else if snapshot.plugged != self.battery.plugged {
                self.battery.plugged = snapshot.plugged;
                should_evaluate = true;
            }
        }

        // No charging decision is meaningful while unplugged.
        if should_evaluate && self.battery.plugged {
            self.evaluate_and_apply();
        }
        let _ = self.battery_tx.send(self.battery);
    }

    fn on_plug_settled(&mut self, generation: u64) {
        if self.pending_plug != Some(generation) {
            debug!(generation, "stale plug settle, ignoring");
            return;
        }
        self.pending_plug = None;
        self.battery.plugged = true;
        debug!(generation, "usb plug settled");
        self.evaluate_and_apply();
        let _ = self.battery_tx.send(self.battery);
    }

    /// Persist a command write, apply it to cached state, then ack.
    ///
    /// On a store failure the cached config is left untouched so durable and
    /// live config never drift apart.
    fn on_command(&mut self, req: CommandRequest) {
        let persisted = match req.kind {
            CommandKind::SetCeiling(level) => self.store.set_ceiling(level),
            CommandKind::SetFloor(level) => self.store.set_floor(level),
            CommandKind::SetEnabled(enabled) => self.store.set_enabled(enabled),
        };

        let outcome = match persisted {
            Ok(()) => {
                match req.kind {
                    CommandKind::SetCeiling(level) => self.cached.ceiling = level,
                    CommandKind::SetFloor(level) => self.cached.floor = level,
                    CommandKind::SetEnabled(enabled) => self.cached.feature_enabled = enabled,
                }
                let _ = self.config_tx.send(self.cached);
                self.evaluate_and_apply();
                Ok(())
            }
            Err(e) => {
                warn!(kind = ?req.kind, error = %e, "settings write failed");
                Err(ChargeError::StoreUnavailable(e.to_string()))
            }
        };
        // The caller may have gone away; that's fine.
        let _ = req.ack.send(outcome);
    }

    /// Run one policy evaluation and issue at most one hardware command.
    fn evaluate_and_apply(&mut self) {
        let decision = evaluate(&self.cached, self.battery.level_pct, self.last_decision);
        self.last_decision = decision.new_last;

        debug!(
            pct = self.battery.level_pct,
            plugged = self.battery.plugged,
            enabled = self.cached.feature_enabled,
            ceiling = self.cached.ceiling,
            floor = self.cached.floor,
            desired = decision.desired,
            "evaluated charge policy"
        );

        // Fail open: if the switch can't be queried, assume charging is
        // allowed rather than blocking the evaluation.
        let current = match self.switch.get_charge_enabled() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "unable to query charge state, assuming enabled");
                true
            }
        };

        if current == decision.desired {
            return;
        }
        if let Err(e) = self.switch.set_charge_enabled(decision.desired) {
            // Not retried here; the next event triggers a fresh attempt.
            error!(desired = decision.desired, error = %e, "failed to update charge state");
        } else {
            info!(enabled = decision.desired, "charge state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargekeeper_hw::MockSwitch;

    struct Rig {
        handle: ControllerHandle,
        switch: Arc<MockSwitch>,
        store: SettingsStore,
        _shutdown: watch::Sender<bool>,
    }

    /// Spin up a controller over an in-memory store and a mock switch.
    fn rig(store: SettingsStore, switch_enabled: bool) -> Rig {
        let switch = Arc::new(MockSwitch::new(switch_enabled));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handle, _task) = spawn_controller(
            store.clone(),
            switch.clone(),
            ControllerConfig {
                usb_settle: Duration::from_millis(100),
            },
            shutdown_rx,
        );
        Rig {
            handle,
            switch,
            store,
            _shutdown: shutdown_tx,
        }
    }

    fn enabled_store(ceiling: u8, floor: u8) -> SettingsStore {
        let store = SettingsStore::open_in_memory().unwrap();
        store.set_ceiling(ceiling).unwrap();
        store.set_floor(floor).unwrap();
        store.set_enabled(true).unwrap();
        store
    }

    fn plugged(level: f32) -> BatterySnapshot {
        BatterySnapshot {
            level_pct: level,
            plugged: true,
            source: PlugSource::Ac,
        }
    }

    /// Push a battery event and wait until the worker has processed it.
    async fn feed(rig: &mut Rig, snapshot: BatterySnapshot) {
        rig.handle.push_battery(snapshot).await.unwrap();
        rig.handle.battery_changed().await;
    }

    #[tokio::test]
    async fn startup_loads_config_and_evaluates_once() {
        let store = enabled_store(80, 75);
        let rig = rig(store, true);
        // Wait for the worker by doing an acked write.
        rig.handle.set_floor(75).await.unwrap();
        assert_eq!(rig.handle.ceiling(), 80);
        assert_eq!(rig.handle.floor(), 75);
        assert!(rig.handle.enabled());
        // Boot evaluation at level 0 (< floor) wants charging on; the switch
        // already reports enabled, so no command was issued.
        assert!(rig.switch.commands().is_empty());
    }

    #[tokio::test]
    async fn ceiling_suspends_and_floor_resumes() {
        let mut rig = rig(enabled_store(80, 75), true);

        feed(&mut rig, plugged(81.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);

        // Inside the band: suspension latches.
        feed(&mut rig, plugged(77.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);

        feed(&mut rig, plugged(74.0)).await;
        assert_eq!(rig.switch.commands(), vec![false, true]);
    }

    #[tokio::test]
    async fn boundary_sequence_matches_decision_table() {
        let mut rig = rig(enabled_store(80, 75), true);
        let mut states = Vec::new();
        for level in [74.0, 76.0, 81.0, 77.0, 74.0] {
            feed(&mut rig, plugged(level)).await;
            states.push(rig.switch.get_charge_enabled().unwrap());
        }
        assert_eq!(states, vec![true, true, false, false, true]);
    }

    #[tokio::test]
    async fn repeated_snapshot_issues_no_new_command() {
        let mut rig = rig(enabled_store(80, 75), true);
        feed(&mut rig, plugged(85.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);
        // Unchanged inputs: dedupe, no evaluation, no command.
        feed(&mut rig, plugged(85.0)).await;
        feed(&mut rig, plugged(85.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);
    }

    #[tokio::test]
    async fn unplugged_level_changes_are_suppressed() {
        let mut rig = rig(enabled_store(80, 75), true);
        for level in [90.0, 95.0, 99.0] {
            feed(
                &mut rig,
                BatterySnapshot {
                    level_pct: level,
                    plugged: false,
                    source: PlugSource::None,
                },
            )
            .await;
        }
        assert!(rig.switch.commands().is_empty());
    }

    #[tokio::test]
    async fn disabling_the_feature_restores_charging() {
        let mut rig = rig(enabled_store(80, 75), true);
        feed(&mut rig, plugged(90.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);

        rig.handle.set_enabled(false).await.unwrap();
        assert_eq!(rig.switch.commands(), vec![false, true]);
    }

    #[tokio::test]
    async fn config_write_applies_and_reevaluates() {
        let mut rig = rig(enabled_store(80, 75), true);
        feed(&mut rig, plugged(85.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);

        // Raising the ceiling alone puts 85 inside the new band, where the
        // latched suspension carries forward.
        rig.handle.set_ceiling(90).await.unwrap();
        assert_eq!(rig.switch.commands(), vec![false]);

        // Raising the floor above the level forces charging back on.
        rig.handle.set_floor(86).await.unwrap();
        assert_eq!(rig.switch.commands(), vec![false, true]);
        assert_eq!(rig.store.floor().unwrap(), 86);
    }

    #[tokio::test]
    async fn failed_persist_leaves_cached_config_untouched() {
        let mut rig = rig(enabled_store(80, 75), true);
        feed(&mut rig, plugged(78.0)).await;
        assert!(rig.switch.commands().is_empty());

        rig.store.set_fail_writes(true);
        let err = rig.handle.set_ceiling(70).await.unwrap_err();
        assert!(matches!(err, ChargeError::StoreUnavailable(_)));
        // Durable and live config must not drift: the cache keeps the old
        // ceiling and no re-evaluation reached the hardware.
        assert_eq!(rig.handle.ceiling(), 80);
        assert_eq!(rig.store.ceiling().unwrap(), 80);
        assert!(rig.switch.commands().is_empty());

        // Once the store recovers the same write goes through and applies.
        rig.store.set_fail_writes(false);
        rig.handle.set_ceiling(70).await.unwrap();
        assert_eq!(rig.handle.ceiling(), 70);
        assert_eq!(rig.switch.commands(), vec![false]);
    }

    #[tokio::test]
    async fn external_store_change_is_picked_up() {
        let store = enabled_store(80, 75);
        let mut rig = rig(store.clone(), true);
        feed(&mut rig, plugged(78.0)).await;
        assert!(rig.switch.commands().is_empty());

        // Another process lowers the ceiling below the current level.
        store.set_ceiling(70).unwrap();
        rig.handle
            .push_event(ControlEvent::ConfigChanged(SettingKey::Ceiling))
            .await
            .unwrap();
        // The queue is FIFO: an acked write behind the notification proves
        // it was processed. Re-persisting the same flag changes nothing.
        rig.handle.set_enabled(true).await.unwrap();
        assert_eq!(rig.handle.ceiling(), 70);
        assert_eq!(rig.switch.commands(), vec![false]);
    }

    #[tokio::test]
    async fn hardware_query_failure_fails_open() {
        let mut rig = rig(enabled_store(80, 75), true);
        rig.switch.set_fail_get(true);
        // Level below floor: desired=true, query fails → assumed enabled →
        // no command issued, no crash.
        feed(&mut rig, plugged(50.0)).await;
        assert!(rig.switch.commands().is_empty());
    }

    #[tokio::test]
    async fn hardware_command_failure_is_retried_on_next_event() {
        let mut rig = rig(enabled_store(80, 75), true);
        rig.switch.set_fail_set(true);
        feed(&mut rig, plugged(90.0)).await;
        assert!(rig.switch.commands().is_empty());

        rig.switch.set_fail_set(false);
        feed(&mut rig, plugged(91.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn usb_plug_in_defers_the_plugged_flag() {
        let mut rig = rig(enabled_store(80, 75), true);

        feed(
            &mut rig,
            BatterySnapshot {
                level_pct: 90.0,
                plugged: true,
                source: PlugSource::Usb,
            },
        )
        .await;
        // Still treated as unplugged inside the settle window.
        assert!(!rig.handle.battery().plugged);
        assert!(rig.switch.commands().is_empty());

        // Once the settle timer fires, the plug is accepted and evaluated.
        rig.handle.battery_changed().await;
        assert!(rig.handle.battery().plugged);
        assert_eq!(rig.switch.commands(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn unplug_during_settle_cancels_the_plug_in() {
        let mut rig = rig(enabled_store(80, 75), true);

        feed(
            &mut rig,
            BatterySnapshot {
                level_pct: 90.0,
                plugged: true,
                source: PlugSource::Usb,
            },
        )
        .await;
        // Unplugged again before the timer fires.
        feed(
            &mut rig,
            BatterySnapshot {
                level_pct: 90.0,
                plugged: false,
                source: PlugSource::None,
            },
        )
        .await;

        // Let the stale settle timer fire and be ignored.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!rig.handle.battery().plugged);
        assert!(rig.switch.commands().is_empty());
    }

    #[tokio::test]
    async fn ac_plug_in_is_immediate() {
        let mut rig = rig(enabled_store(80, 75), true);
        feed(&mut rig, plugged(90.0)).await;
        assert_eq!(rig.switch.commands(), vec![false]);
    }
}
