//! Settings watcher — forwards store change notifications onto the control
//! queue.
//!
//! The store broadcasts which key changed; the worker then reloads exactly
//! that key. A lagged receiver (too many notifications queued) degrades to a
//! full reload by forwarding every key.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use chargekeeper_store::SettingKey;

use crate::event::ControlEvent;
use crate::handle::ControllerHandle;

/// Spawn the watcher task. Runs until shutdown or until either channel
/// closes.
pub fn spawn_settings_watcher(
    mut notifications: broadcast::Receiver<SettingKey>,
    handle: ControllerHandle,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("settings watcher started");
        loop {
            tokio::select! {
                note = notifications.recv() => {
                    match note {
                        Ok(key) => {
                            if handle
                                .push_event(ControlEvent::ConfigChanged(key))
                                .await
                                .is_err()
                            {
                                debug!("control queue closed, settings watcher exiting");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "settings notifications lagged, full reload");
                            for key in SettingKey::all() {
                                if handle
                                    .push_event(ControlEvent::ConfigChanged(key))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("settings store dropped, watcher exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    debug!("settings watcher shutting down");
                    break;
                }
            }
        }
    })
}
