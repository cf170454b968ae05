//! Non-overlapping Allan variance and two-point Allan deviation.
//!
//! AVAR works on frequency-like data (power, amplitude): the series is split
//! into `M = N / K` groups of `K` samples and
//! `sigma^2(K tau0) = sum (ybar[j+1] - ybar[j])^2 / (2 (M - 1))`.
//!
//! ADEV works on phase-like data (voltage, gain, phase) sampled at a fixed
//! short averaging time `tau`:
//! `sigma(2, K tau) = sqrt(sum_{i < L-K-1} (x[i+K] - x[i])^2 / (2 (L - K - 1)))`.
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::analysis::error::{Result, StabilityError};
use crate::analysis::preprocess::{boxcar_average, mean_normalize, unwrap_phase};
use crate::analysis::trace::Trace;

/// Guards `floor(t / tau0)` against `t` being a float hair below a multiple of `tau0`.
const TAU_EPSILON: f64 = 1e-9;

/// Integration-time window requested by the caller, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TauRange {
    pub t_min: f64,
    pub t_max: f64,
}

impl TauRange {
    pub fn new(t_min: f64, t_max: f64) -> Result<Self> {
        let range = Self { t_min, t_max };
        range.validate()?;
        Ok(range)
    }

    /// Everything from one sample up to the full series.
    pub fn full() -> Self {
        Self {
            t_min: 0.0,
            t_max: f64::INFINITY,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.t_max < self.t_min || self.t_max.is_nan() || self.t_min.is_nan() {
            return Err(StabilityError::InvalidSampling(format!(
                "TMax {} is below TMin {}",
                self.t_max, self.t_min
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllanMode {
    Avar,
    Adev,
}

#[derive(Clone, Copy, Debug)]
pub struct AvarOptions {
    pub normalize: bool,
}

impl Default for AvarOptions {
    fn default() -> Self {
        Self { normalize: true }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AdevOptions {
    /// Unwrap with this period before differencing (phase data).
    pub unwrap_period: Option<f64>,
    /// Reference RF in Hz; when set, degree differences are reported in femtoseconds.
    pub rf_hz: Option<f64>,
    pub normalize: bool,
}

fn check_tau0(tau0: f64) -> Result<()> {
    if tau0 > 0.0 {
        Ok(())
    } else {
        Err(StabilityError::InvalidSampling(format!(
            "tau0 must be positive, got {tau0}"
        )))
    }
}

fn whole_samples(t: f64, tau0: f64) -> usize {
    (t / tau0 + TAU_EPSILON).floor() as usize
}

/// Non-overlapping Allan variance for `K = 1 ..= Kmax`.
pub fn allan_variance(
    data: &[f64],
    tau0: f64,
    range: TauRange,
    options: AvarOptions,
) -> Result<Trace> {
    check_tau0(tau0)?;
    range.validate()?;
    let n = data.len();
    if n < 2 {
        return Err(StabilityError::SeriesTooShort {
            required: 2,
            actual: n,
        });
    }
    let normalized;
    let y = if options.normalize {
        normalized = mean_normalize(data)?;
        &normalized[..]
    } else {
        data
    };

    let span = n as f64 * tau0;
    let t_max = range.t_max.min(span).max(tau0);
    if t_max < range.t_max {
        debug!("TMax {} clamped to {t_max} s for {n} samples", range.t_max);
    }
    let mut k_max = whole_samples(t_max, tau0).max(1);
    if k_max > n / 2 {
        debug!("Kmax reduced from {k_max} to {} to keep two groups", n / 2);
        k_max = n / 2;
    }

    let mut trace = Trace::with_capacity(k_max);
    for k in 1..=k_max {
        let means = boxcar_average(y, k)?;
        let m = means.len();
        let sum: f64 = means.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        let avar = sum / (2.0 * (m - 1) as f64);
        trace.push(k as f64 * tau0, avar, avar / ((m - 1) as f64).sqrt());
    }
    Ok(trace)
}

/// Two-point Allan deviation over `[TMin, TMax]`.
///
/// `TMin` is coerced up to a whole multiple `K0 * tau0`; for `K0 > 1` the
/// series is first boxcar-averaged by `K0`.
pub fn allan_deviation(
    data: &[f64],
    tau0: f64,
    range: TauRange,
    options: AdevOptions,
) -> Result<Trace> {
    check_tau0(tau0)?;
    range.validate()?;
    let scale = match options.rf_hz {
        Some(rf) if rf > 0.0 => (1.0 / rf) * (1e15 / 360.0),
        Some(_) => {
            return Err(StabilityError::MissingReference(
                "femtosecond scaling requires fRF > 0",
            ))
        }
        None => 1.0,
    };

    let n = data.len();
    let t_min = range.t_min.max(tau0);
    let k0 = ((t_min / tau0) - TAU_EPSILON).ceil().max(1.0) as usize;
    if n < 2 * k0 {
        return Err(StabilityError::SeriesTooShort {
            required: 2 * k0,
            actual: n,
        });
    }
    if k0 as f64 * tau0 != range.t_min {
        debug!("TMin {} coerced to {} s", range.t_min, k0 as f64 * tau0);
    }

    let mut x = match options.unwrap_period {
        Some(period) => unwrap_phase(data, period),
        None => data.to_vec(),
    };
    if options.normalize {
        x = mean_normalize(&x)?;
    }
    if k0 > 1 {
        x = boxcar_average(&x, k0)?;
    }
    let tau = k0 as f64 * tau0;
    let l = x.len();
    if l < 3 {
        return Err(StabilityError::SeriesTooShort {
            required: 3 * k0,
            actual: n,
        });
    }

    let t_max = range.t_max.min(l as f64 * tau);
    let mut k_max = whole_samples(t_max, tau).max(1);
    if k_max > l - 2 {
        debug!("Kmax reduced from {k_max} to {}", l - 2);
        k_max = l - 2;
    }

    let mut trace = Trace::with_capacity(k_max);
    for k in 1..=k_max {
        let terms = l - k - 1;
        let sum: f64 = (0..terms)
            .map(|i| (scale * (x[i + k] - x[i])).powi(2))
            .sum();
        let adev = (sum / (2.0 * terms as f64)).sqrt();
        trace.push(k as f64 * tau, adev, adev / (terms as f64).sqrt());
    }
    Ok(trace)
}

/// Dominant noise process read off the log-log slope of an Allan trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoiseType {
    WhitePhase,       // deviation slope -1
    WhiteFrequency,   // -1/2
    FlickerFrequency, // 0
    RandomWalk,       // +1/2
    Drift,            // +1
    Unknown,
}

impl fmt::Display for NoiseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NoiseType::WhitePhase => "white phase",
            NoiseType::WhiteFrequency => "white frequency",
            NoiseType::FlickerFrequency => "flicker frequency",
            NoiseType::RandomWalk => "random walk",
            NoiseType::Drift => "drift",
            NoiseType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Least-squares slope of `ln(value)` against `ln(tau)`, in deviation units.
///
/// Variance traces are halved so both modes classify on the same scale.
pub fn identify_noise_type(trace: &Trace, mode: AllanMode) -> NoiseType {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    let mut n = 0usize;
    for p in trace.points.iter().filter(|p| p.x > 0.0 && p.y > 0.0) {
        let lx = p.x.ln();
        let ly = p.y.ln();
        sum_x += lx;
        sum_y += ly;
        sum_xx += lx * lx;
        sum_xy += lx * ly;
        n += 1;
    }
    if n < 3 {
        return NoiseType::Unknown;
    }
    let n = n as f64;
    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return NoiseType::Unknown;
    }
    let mut slope = (n * sum_xy - sum_x * sum_y) / denom;
    if mode == AllanMode::Avar {
        slope /= 2.0;
    }
    match slope {
        s if s < -0.75 => NoiseType::WhitePhase,
        s if s < -0.25 => NoiseType::WhiteFrequency,
        s if s < 0.25 => NoiseType::FlickerFrequency,
        s if s < 0.75 => NoiseType::RandomWalk,
        _ => NoiseType::Drift,
    }
}
