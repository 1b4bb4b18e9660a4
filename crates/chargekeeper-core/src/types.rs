//! Domain types shared across the chargekeeper crates.
//!
//! All types are serializable for persistence in the settings store and for
//! the REST surface.

use serde::{Deserialize, Serialize};

/// Default charge ceiling (percent) when no value has been persisted.
pub const DEFAULT_CEILING: u8 = 80;
/// Default charge floor (percent) when no value has been persisted.
pub const DEFAULT_FLOOR: u8 = 75;

/// Charge-limiting configuration.
///
/// `ceiling` and `floor` are independently validated to `0..=100` at write
/// time. No ordering invariant is enforced between them — an inverted config
/// (floor ≥ ceiling) is legal and resolves through the hysteresis band rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChargeConfig {
    /// Battery percent at/above which charging is suspended.
    pub ceiling: u8,
    /// Battery percent below which charging is forced back on.
    pub floor: u8,
    /// Master toggle. When false, charging is always allowed.
    pub feature_enabled: bool,
}

impl Default for ChargeConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            floor: DEFAULT_FLOOR,
            feature_enabled: false,
        }
    }
}

/// What the device is drawing power from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlugSource {
    Ac,
    Usb,
    Wireless,
    /// Not plugged in, or the supply type could not be determined.
    None,
}

/// Battery telemetry as last reported by the event source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatterySnapshot {
    /// Battery level, normalized to `0.0..=100.0`.
    pub level_pct: f32,
    /// Whether any power source is attached.
    pub plugged: bool,
    /// The attached power source kind.
    pub source: PlugSource,
}

impl Default for BatterySnapshot {
    fn default() -> Self {
        Self {
            level_pct: 0.0,
            plugged: false,
            source: PlugSource::None,
        }
    }
}

impl BatterySnapshot {
    /// Normalize a raw/scale reading pair into a percentage snapshot.
    ///
    /// A zero or negative scale yields a 0% level rather than a NaN.
    pub fn from_raw(raw: i64, scale: i64, plugged: bool, source: PlugSource) -> Self {
        let level_pct = if scale > 0 {
            ((raw as f32) * 100.0 / (scale as f32)).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            level_pct,
            plugged,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = ChargeConfig::default();
        assert_eq!(cfg.ceiling, 80);
        assert_eq!(cfg.floor, 75);
        assert!(!cfg.feature_enabled);
    }

    #[test]
    fn snapshot_normalizes_raw_scale() {
        let snap = BatterySnapshot::from_raw(2_750_000, 5_000_000, true, PlugSource::Ac);
        assert!((snap.level_pct - 55.0).abs() < 0.01);
        assert!(snap.plugged);
    }

    #[test]
    fn snapshot_zero_scale_is_zero_percent() {
        let snap = BatterySnapshot::from_raw(1000, 0, false, PlugSource::None);
        assert_eq!(snap.level_pct, 0.0);
    }

    #[test]
    fn snapshot_clamps_overfull_battery() {
        // Aged batteries can report charge_now above charge_full.
        let snap = BatterySnapshot::from_raw(5_100_000, 5_000_000, true, PlugSource::Ac);
        assert_eq!(snap.level_pct, 100.0);
    }

    #[test]
    fn plug_source_serde_round_trip() {
        let json = serde_json::to_string(&PlugSource::Usb).unwrap();
        assert_eq!(json, "\"usb\"");
    }
}
