use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::allan::NoiseType;
use crate::analysis::error::{Result, StabilityError};
use crate::analysis::units::Units;

/// One `(x, y, yErr)` sample of a computed trace. `y_err == 0` means no error bar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub x: f64,
    pub y: f64,
    pub y_err: f64,
}

/// Ordered output of an engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub points: Vec<TracePoint>,
}

impl Trace {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, x: f64, y: f64, y_err: f64) {
        self.points.push(TracePoint {
            x,
            y,
            y_err: y_err.max(0.0),
        });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y_err).collect()
    }
}

/// Ternary compliance verdict. Once `Fail`, always `Fail`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataStatus {
    #[default]
    Unknown,
    Pass,
    Fail,
}

impl DataStatus {
    /// Folds one spec verdict into the running status. `None` is missing data.
    pub fn absorb(self, verdict: Option<bool>) -> Self {
        match (self, verdict) {
            (status, None) => status,
            (DataStatus::Fail, _) | (_, Some(false)) => DataStatus::Fail,
            (_, Some(true)) => DataStatus::Pass,
        }
    }

    /// Combines two already aggregated statuses, e.g. across series.
    pub fn merge(self, other: DataStatus) -> Self {
        match other {
            DataStatus::Unknown => self,
            DataStatus::Pass => self.absorb(Some(true)),
            DataStatus::Fail => DataStatus::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataStatus::Unknown => "UNKNOWN",
            DataStatus::Pass => "PASS",
            DataStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for DataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataStatus {
    type Err = StabilityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(DataStatus::Unknown),
            "PASS" => Ok(DataStatus::Pass),
            "FAIL" => Ok(DataStatus::Fail),
            _ => Err(StabilityError::UnknownVariant {
                kind: "data status",
                value: s.to_string(),
            }),
        }
    }
}

/// Record handed to trace consumers (plot layer, storage).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub name: String,
    pub x_values: Vec<f64>,
    pub y_values: Vec<f64>,
    pub y_error: Vec<f64>,
    pub x_units: Units,
    pub y_units: Units,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_string: Option<String>,
    pub data_status: DataStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_type: Option<NoiseType>,
    /// Provider tags forwarded untouched to the plot layer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl TraceRecord {
    pub fn from_trace(
        name: impl Into<String>,
        trace: &Trace,
        x_units: Units,
        y_units: Units,
    ) -> Self {
        Self {
            name: name.into(),
            x_values: trace.xs(),
            y_values: trace.ys(),
            y_error: trace.errors(),
            x_units,
            y_units,
            compliance_string: None,
            data_status: DataStatus::Unknown,
            noise_type: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.x_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_values.is_empty()
    }
}
