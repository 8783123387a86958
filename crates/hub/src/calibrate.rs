//! Sensor calibration: raw analog readings to clamped percentages, plus
//! moisture classification.
//!
//! The comb's light and moisture sensors are wired so a higher ADC count
//! means *less* of the physical quantity, hence the inverted map. Firmware
//! may send either raw 12-bit counts or an already-normalized percentage;
//! the `> 100` check is the only way to tell the two apart on the current
//! wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Full-scale value of the comb's 12-bit ADC.
const ADC_MAX: f64 = 4095.0;

/// Convert a raw sensor value to a percentage in `0.0..=100.0`.
///
/// Values above 100 are treated as raw ADC counts and mapped inversely
/// (4095 → 0%, 0 → 100%); values at or below 100 pass through unchanged.
/// Both branches clamp, since noisy sensors can read outside calibration
/// bounds.
pub(crate) fn normalize(raw: f64) -> f64 {
    let percent = if raw > 100.0 {
        ((ADC_MAX - raw) / ADC_MAX) * 100.0
    } else {
        raw
    };
    percent.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MoistureStatus {
    Dry,
    Normal,
    Oily,
}

impl MoistureStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            MoistureStatus::Dry => "dry",
            MoistureStatus::Normal => "normal",
            MoistureStatus::Oily => "oily",
        }
    }
}

impl fmt::Display for MoistureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoistureStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry" => Ok(MoistureStatus::Dry),
            "normal" => Ok(MoistureStatus::Normal),
            "oily" => Ok(MoistureStatus::Oily),
            _ => Err(format!("unknown moisture status '{s}'")),
        }
    }
}

/// Classify a raw moisture value into dry/normal/oily.
///
/// Recomputes the percentage from the raw input so the status always agrees
/// with the stored `moisture` value. Boundary percentages (exactly 30 or 70)
/// count as normal.
pub(crate) fn classify_moisture(raw: f64) -> MoistureStatus {
    let percent = normalize(raw);
    if percent < 30.0 {
        MoistureStatus::Dry
    } else if percent > 70.0 {
        MoistureStatus::Oily
    } else {
        MoistureStatus::Normal
    }
}

// ===========================================================================
// Tests
// ===========================================================================
