//! The charge hysteresis policy.
//!
//! Charging is suspended at/above `ceiling` and resumed below `floor`. Inside
//! the band `[floor, ceiling)` the previous decision is carried forward, so
//! the switch never oscillates around a single threshold. The degenerate case
//! `floor >= ceiling` matches neither threshold rule for in-between levels
//! and falls into the band arm, which keeps it deterministic.

use crate::types::ChargeConfig;

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether charging should currently be enabled.
    pub desired: bool,
    /// Hysteresis memory to carry into the next evaluation.
    pub new_last: bool,
}

/// Evaluate the hysteresis policy.
///
/// Pure: the caller owns `last_decision` (the hysteresis memory) and feeds
/// back `new_last`. When the feature is disabled, charging is always allowed
/// and the memory is left untouched.
pub fn evaluate(config: &ChargeConfig, level_pct: f32, last_decision: bool) -> Decision {
    if !config.feature_enabled {
        return Decision {
            desired: true,
            new_last: last_decision,
        };
    }

    if level_pct >= config.ceiling as f32 {
        Decision {
            desired: false,
            new_last: false,
        }
    } else if level_pct < config.floor as f32 {
        Decision {
            desired: true,
            new_last: true,
        }
    } else {
        // Inside [floor, ceiling): carry the previous decision.
        Decision {
            desired: last_decision,
            new_last: last_decision,
        }
    }
}
