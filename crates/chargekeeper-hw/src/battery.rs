//! Battery telemetry — reads level and plug state from sysfs and feeds the
//! control queue.
//!
//! Level comes from the `charge_now`/`charge_full` raw pair when the battery
//! exposes it (normalized to a float percentage), falling back to the integer
//! `capacity` attribute. Plug state comes from the `online` flag of Mains /
//! USB / Wireless supply nodes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use chargekeeper_core::types::{BatterySnapshot, PlugSource};

/// Reads battery telemetry from a power-supply sysfs root.
pub struct BatteryReader {
    root: PathBuf,
}

impl BatteryReader {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Take one telemetry reading, or `None` if no battery node exists.
    pub fn read(&self) -> Option<BatterySnapshot> {
        let battery = self.find_battery()?;
        let (plugged, source) = self.plug_state();

        // Prefer the raw/scale pair for sub-percent resolution.
        let raw = read_i64(&battery.join("charge_now"))
            .or_else(|| read_i64(&battery.join("energy_now")));
        let scale = read_i64(&battery.join("charge_full"))
            .or_else(|| read_i64(&battery.join("energy_full")));

        let snapshot = match (raw, scale) {
            (Some(raw), Some(scale)) => BatterySnapshot::from_raw(raw, scale, plugged, source),
            _ => {
                let capacity = read_i64(&battery.join("capacity"))?;
                BatterySnapshot {
                    level_pct: (capacity.clamp(0, 100)) as f32,
                    plugged,
                    source,
                }
            }
        };
        trace!(
            level = snapshot.level_pct,
            plugged = snapshot.plugged,
            ?source,
            "battery read"
        );
        Some(snapshot)
    }

    /// First battery node under the root.
    fn find_battery(&self) -> Option<PathBuf> {
        for entry in fs::read_dir(&self.root).ok()?.flatten() {
            let dir = entry.path();
            if read_trimmed(&dir.join("type")).is_some_and(|t| t == "Battery") {
                return Some(dir);
            }
        }
        None
    }

    /// Plug state from the online supply nodes. AC wins over USB over
    /// Wireless when several report online simultaneously.
    fn plug_state(&self) -> (bool, PlugSource) {
        let mut source = PlugSource::None;
        let Ok(entries) = fs::read_dir(&self.root) else {
            return (false, source);
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            let Some(kind) = read_trimmed(&dir.join("type")) else {
                continue;
            };
            let online = read_i64(&dir.join("online")).is_some_and(|v| v != 0);
            if !online {
                continue;
            }
            let candidate = match kind.as_str() {
                "Mains" => PlugSource::Ac,
                "USB" => PlugSource::Usb,
                "Wireless" => PlugSource::Wireless,
                _ => continue,
            };
            source = match (source, candidate) {
                (PlugSource::Ac, _) => PlugSource::Ac,
                (_, PlugSource::Ac) => PlugSource::Ac,
                (PlugSource::Usb, _) => PlugSource::Usb,
                (_, c) => c,
            };
        }
        (source != PlugSource::None, source)
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_i64(path: &Path) -> Option<i64> {
    read_trimmed(path)?.parse().ok()
}

/// Spawn the telemetry polling task.
///
/// Sends a snapshot into `events` on every poll; the controller deduplicates,
/// so repeat readings are harmless. Stops when the shutdown watch flips or
/// the receiving side goes away.
pub fn spawn_battery_poller(
    reader: BatteryReader,
    interval: Duration,
    events: mpsc::Sender<BatterySnapshot>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(?interval, "battery poller started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match reader.read() {
                        Some(snapshot) => {
                            if events.send(snapshot).await.is_err() {
                                debug!("control queue closed, battery poller exiting");
                                break;
                            }
                        }
                        None => warn!("battery telemetry unavailable this cycle"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("battery poller shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();
            Self { _dir: dir, root }
        }

        fn battery(&self, files: &[(&str, &str)]) {
            let dir = self.root.join("BAT0");
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("type"), "Battery\n").unwrap();
            for (name, value) in files {
                fs::write(dir.join(name), value).unwrap();
            }
        }

        fn supply(&self, name: &str, kind: &str, online: bool) {
            let dir = self.root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("type"), format!("{kind}\n")).unwrap();
            fs::write(dir.join("online"), if online { "1\n" } else { "0\n" }).unwrap();
        }

        fn reader(&self) -> BatteryReader {
            BatteryReader::new(&self.root)
        }
    }

    #[test]
    fn raw_scale_pair_wins_over_capacity() {
        let fx = Fixture::new();
        fx.battery(&[
            ("charge_now", "2750000\n"),
            ("charge_full", "5000000\n"),
            ("capacity", "54\n"),
        ]);
        let snap = fx.reader().read().unwrap();
        assert!((snap.level_pct - 55.0).abs() < 0.01);
    }

    #[test]
    fn capacity_fallback_when_no_raw_pair() {
        let fx = Fixture::new();
        fx.battery(&[("capacity", "42\n")]);
        let snap = fx.reader().read().unwrap();
        assert_eq!(snap.level_pct, 42.0);
    }

    #[test]
    fn no_battery_node_reads_none() {
        let fx = Fixture::new();
        fx.supply("AC", "Mains", true);
        assert!(fx.reader().read().is_none());
    }

    #[test]
    fn unplugged_when_no_supply_online() {
        let fx = Fixture::new();
        fx.battery(&[("capacity", "60\n")]);
        fx.supply("AC", "Mains", false);
        let snap = fx.reader().read().unwrap();
        assert!(!snap.plugged);
        assert_eq!(snap.source, PlugSource::None);
    }

    #[test]
    fn usb_plug_detected() {
        let fx = Fixture::new();
        fx.battery(&[("capacity", "60\n")]);
        fx.supply("ucsi-source-psy-1", "USB", true);
        let snap = fx.reader().read().unwrap();
        assert!(snap.plugged);
        assert_eq!(snap.source, PlugSource::Usb);
    }

    #[test]
    fn mains_wins_over_usb() {
        let fx = Fixture::new();
        fx.battery(&[("capacity", "60\n")]);
        fx.supply("USB", "USB", true);
        fx.supply("AC", "Mains", true);
        let snap = fx.reader().read().unwrap();
        assert_eq!(snap.source, PlugSource::Ac);
    }

    #[tokio::test]
    async fn poller_emits_and_shuts_down() {
        let fx = Fixture::new();
        fx.battery(&[("capacity", "73\n")]);

        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle =
            spawn_battery_poller(fx.reader(), Duration::from_millis(10), tx, shutdown_rx);

        let snap = rx.recv().await.unwrap();
        assert_eq!(snap.level_pct, 73.0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
