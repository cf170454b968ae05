//! Unit tags and the conversions defined between them.
//!
//! Value conversions are lossless and bidirectional:
//! - `VOLTS <-> MV` and `WATTS <-> MW` scale by 1e3.
//! - `WATTS <-> DBM` and `MW <-> DBM` via `dBm = 10 * log10(mW)`.
//! - `VOLTS -> DELTA_GAIN` divides by a positive gain reference.
//!
//! Time axes convert from `LOCALTIME` to seconds, minutes or milliseconds
//! relative to the first timestamp. Every other pair is rejected.
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::analysis::error::{Result, StabilityError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Units {
    #[serde(rename = "WATTS")]
    Watts,
    #[serde(rename = "MW")]
    MilliWatts,
    #[serde(rename = "DBM")]
    Dbm,
    #[serde(rename = "VOLTS")]
    Volts,
    #[serde(rename = "MV")]
    MilliVolts,
    #[serde(rename = "DEG")]
    Degrees,
    #[serde(rename = "AMPLITUDE")]
    Amplitude,
    #[serde(rename = "DELTA_GAIN")]
    DeltaGain,
    #[serde(rename = "SECONDS")]
    Seconds,
    #[serde(rename = "MINUTES")]
    Minutes,
    #[serde(rename = "MS")]
    Milliseconds,
    #[serde(rename = "LOCALTIME")]
    LocalTime,
    #[serde(rename = "AVAR")]
    Avar,
    #[serde(rename = "ADEV")]
    Adev,
    #[serde(rename = "PER_ROOT_HZ")]
    PerRootHz,
    #[serde(rename = "PER_HZ")]
    PerHz,
    #[serde(rename = "FS")]
    Femtoseconds,
    #[serde(rename = "HZ")]
    Hertz,
}

impl Units {
    pub const ALL: [Units; 18] = [
        Units::Watts,
        Units::MilliWatts,
        Units::Dbm,
        Units::Volts,
        Units::MilliVolts,
        Units::Degrees,
        Units::Amplitude,
        Units::DeltaGain,
        Units::Seconds,
        Units::Minutes,
        Units::Milliseconds,
        Units::LocalTime,
        Units::Avar,
        Units::Adev,
        Units::PerRootHz,
        Units::PerHz,
        Units::Femtoseconds,
        Units::Hertz,
    ];

    /// Stable string form used for tag storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Watts => "WATTS",
            Units::MilliWatts => "MW",
            Units::Dbm => "DBM",
            Units::Volts => "VOLTS",
            Units::MilliVolts => "MV",
            Units::Degrees => "DEG",
            Units::Amplitude => "AMPLITUDE",
            Units::DeltaGain => "DELTA_GAIN",
            Units::Seconds => "SECONDS",
            Units::Minutes => "MINUTES",
            Units::Milliseconds => "MS",
            Units::LocalTime => "LOCALTIME",
            Units::Avar => "AVAR",
            Units::Adev => "ADEV",
            Units::PerRootHz => "PER_ROOT_HZ",
            Units::PerHz => "PER_HZ",
            Units::Femtoseconds => "FS",
            Units::Hertz => "HZ",
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(
            self,
            Units::Seconds | Units::Minutes | Units::Milliseconds | Units::LocalTime
        )
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = StabilityError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Units::ALL
            .iter()
            .copied()
            .find(|u| u.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| StabilityError::UnknownVariant {
                kind: "units",
                value: s.to_string(),
            })
    }
}

/// What a series measures; drives engine selection and normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataKind {
    Amplitude,
    Power,
    Phase,
    Voltage,
    Gain,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Amplitude => "AMPLITUDE",
            DataKind::Power => "POWER",
            DataKind::Phase => "PHASE",
            DataKind::Voltage => "VOLTAGE",
            DataKind::Gain => "GAIN",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = StabilityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AMPLITUDE" => Ok(DataKind::Amplitude),
            "POWER" => Ok(DataKind::Power),
            "PHASE" => Ok(DataKind::Phase),
            "VOLTAGE" => Ok(DataKind::Voltage),
            "GAIN" => Ok(DataKind::Gain),
            _ => Err(StabilityError::UnknownVariant {
                kind: "data kind",
                value: s.to_string(),
            }),
        }
    }
}

fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Converts sample values between unit tags.
///
/// `gain_ref` is only consulted for `VOLTS -> DELTA_GAIN` and must be positive.
pub fn convert(values: &[f64], from: Units, to: Units, gain_ref: Option<f64>) -> Result<Vec<f64>> {
    if from == to {
        return Ok(values.to_vec());
    }
    let map = |f: fn(f64) -> f64| -> Result<Vec<f64>> {
        Ok(values.iter().copied().map(f).collect())
    };
    match (from, to) {
        (Units::Volts, Units::MilliVolts) | (Units::Watts, Units::MilliWatts) => map(|v| v * 1e3),
        (Units::MilliVolts, Units::Volts) | (Units::MilliWatts, Units::Watts) => map(|v| v / 1e3),
        (Units::MilliWatts, Units::Dbm) => map(mw_to_dbm),
        (Units::Dbm, Units::MilliWatts) => map(dbm_to_mw),
        (Units::Watts, Units::Dbm) => map(|w| mw_to_dbm(w * 1e3)),
        (Units::Dbm, Units::Watts) => map(|dbm| dbm_to_mw(dbm) / 1e3),
        (Units::Volts, Units::DeltaGain) => {
            let reference = gain_ref
                .filter(|g| *g > 0.0)
                .ok_or(StabilityError::MissingReference("DELTA_GAIN requires gainRef > 0"))?;
            Ok(values.iter().map(|v| v / reference).collect())
        }
        _ => Err(StabilityError::UnsupportedConversion { from, to }),
    }
}

/// Converts wall-clock timestamps to an axis relative to the first one.
///
/// `LOCALTIME` itself yields seconds since the Unix epoch.
pub fn convert_time(timestamps: &[NaiveDateTime], to: Units) -> Result<Vec<f64>> {
    let Some(first) = timestamps.first().copied() else {
        return Ok(Vec::new());
    };
    let scale = match to {
        Units::Seconds => 1.0,
        Units::Minutes => 1.0 / 60.0,
        Units::Milliseconds => 1e3,
        Units::LocalTime => {
            return Ok(timestamps
                .iter()
                .map(|t| t.and_utc().timestamp_micros() as f64 * 1e-6)
                .collect())
        }
        _ => {
            return Err(StabilityError::UnsupportedConversion {
                from: Units::LocalTime,
                to,
            })
        }
    };
    Ok(timestamps
        .iter()
        .map(|t| seconds_between(&first, t) * scale)
        .collect())
}

/// Converts a relative time axis already expressed in seconds.
pub fn convert_seconds(seconds: &[f64], to: Units) -> Result<Vec<f64>> {
    let scale = match to {
        Units::Seconds => 1.0,
        Units::Minutes => 1.0 / 60.0,
        Units::Milliseconds => 1e3,
        _ => {
            return Err(StabilityError::UnsupportedConversion {
                from: Units::Seconds,
                to,
            })
        }
    };
    Ok(seconds.iter().map(|s| s * scale).collect())
}

pub(crate) fn seconds_between(start: &NaiveDateTime, end: &NaiveDateTime) -> f64 {
    let delta = end.signed_duration_since(*start);
    match delta.num_microseconds() {
        Some(us) => us as f64 * 1e-6,
        None => delta.num_milliseconds() as f64 * 1e-3,
    }
}
