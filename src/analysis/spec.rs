//! Spec lines and the compliance check of a trace against them.
//!
//! A spec line `(x1, y1, x2, y2)` is an upper bound that the trace must stay
//! under between `x1` and `x2`. The bound advances linearly per trace index,
//! not per x unit, so it is straight on whatever axis the trace was sampled on.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::error::{Result, StabilityError};

fn parse_floats<const N: usize>(s: &str) -> Result<[f64; N]> {
    let mut out = [0.0; N];
    let mut fields = s.split(',').map(str::trim);
    for slot in out.iter_mut() {
        *slot = fields
            .next()
            .and_then(|f| f.parse::<f64>().ok())
            .ok_or_else(|| StabilityError::InvalidSpec(s.to_string()))?;
    }
    if fields.next().is_some() {
        return Err(StabilityError::InvalidSpec(s.to_string()));
    }
    Ok(out)
}

/// Upper limit line, configured as `"x1, y1, x2, y2"`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl SpecLine {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Both endpoints coincide: a single-point limit.
    pub fn is_point(&self) -> bool {
        self.x1 == self.x2 && self.y1 == self.y2
    }

    /// Checks `y` against the line over the trace indices covered by `[x1, x2]`.
    ///
    /// Returns `None` when no trace point reaches `x1`, which callers treat as
    /// unknown rather than failed.
    pub fn complies(&self, x: &[f64], y: &[f64]) -> Option<bool> {
        let n = x.len().min(y.len());
        let lo = x[..n].iter().position(|&v| v >= self.x1)?;
        let mut hi = lo + x[lo..n].iter().take_while(|&&v| v <= self.x2).count();
        if hi <= lo {
            hi = lo + 1;
        }

        if hi == lo + 1 || self.is_point() {
            return Some(y[lo] <= self.y1);
        }

        let slope = (self.y2 - self.y1) / (hi - lo - 1) as f64;
        let mut limit = self.y1;
        for &value in &y[lo..hi] {
            if value > limit {
                return Some(false);
            }
            limit += slope;
        }
        Some(true)
    }
}

impl FromStr for SpecLine {
    type Err = StabilityError;

    fn from_str(s: &str) -> Result<Self> {
        let [x1, y1, x2, y2] = parse_floats::<4>(s)?;
        Ok(Self { x1, y1, x2, y2 })
    }
}

impl fmt::Display for SpecLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "({}, {:.3e})", self.x1, self.y1)
        } else {
            write!(
                f,
                "({}, {:.3e})-({}, {:.3e})",
                self.x1, self.y1, self.x2, self.y2
            )
        }
    }
}

/// RMS-in-band limit, configured as `"fLo, fHi, RMSmax"`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RmsSpec {
    pub f_lo: f64,
    pub f_hi: f64,
    pub rms_max: f64,
}

impl FromStr for RmsSpec {
    type Err = StabilityError;

    fn from_str(s: &str) -> Result<Self> {
        let [f_lo, f_hi, rms_max] = parse_floats::<3>(s)?;
        if f_hi < f_lo {
            return Err(StabilityError::InvalidSpec(s.to_string()));
        }
        Ok(Self { f_lo, f_hi, rms_max })
    }
}

/// Closed x interval, configured as `"xMin, xMax"`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct XRange {
    pub min: f64,
    pub max: f64,
}

impl XRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }
}

impl FromStr for XRange {
    type Err = StabilityError;

    fn from_str(s: &str) -> Result<Self> {
        let [min, max] = parse_floats::<2>(s)?;
        if max < min {
            return Err(StabilityError::InvalidSpec(s.to_string()));
        }
        Ok(Self { min, max })
    }
}
