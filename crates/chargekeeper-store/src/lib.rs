//! chargekeeper-store — persisted charge settings backed by redb.
//!
//! Three independent keys (`charge.ceiling`, `charge.floor`, `charge.enabled`)
//! are JSON-serialized into a single redb table. The store is `Clone + Send +
//! Sync` (backed by `Arc<Database>`) and supports an in-memory backend for
//! tests.
//!
//! Writers never talk to the controller directly: each successful write
//! publishes the changed key on a broadcast channel, and the settings watcher
//! forwards it onto the control queue. Reads of missing keys fall back to the
//! documented defaults (80 / 75 / disabled).

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{SettingKey, SettingsStore};
