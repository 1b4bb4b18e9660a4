//! chargekeeper-controller — the charge-hysteresis control loop.
//!
//! Everything that mutates controller state flows through one ordered mpsc
//! queue consumed by a single worker task:
//!
//! ```text
//! battery poller ──┐
//! settings store ──┼─▶ ControlEvent queue ─▶ worker ─▶ policy ─▶ charge switch
//! command writes ──┘                          │
//!                                             └─▶ watch snapshots (reads)
//! ```
//!
//! Reads of the cached config and battery state are served from
//! `tokio::sync::watch` snapshots that only the worker updates, so callers
//! never observe a partially-applied config. Writes are acked via `oneshot`
//! only after the worker has persisted and applied them.
//!
//! # Architecture
//!
//! ```text
//! event.rs      — tagged ControlEvent enum + command requests
//! controller.rs — worker loop, hysteresis state, USB settle timer
//! handle.rs     — ControllerHandle: snapshot reads, queued validated writes
//! watcher.rs    — forwards store change notifications onto the queue
//! ```

pub mod controller;
pub mod event;
pub mod handle;
pub mod watcher;

pub use controller::{ControllerConfig, spawn_controller};
pub use event::{CommandKind, ControlEvent};
pub use handle::ControllerHandle;
pub use watcher::spawn_settings_watcher;
