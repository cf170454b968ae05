use std::f64::consts::TAU;

use ndarray::ArrayView1;

use crate::analysis::error::{Result, StabilityError};

/// Wrap period for phase expressed in radians.
pub const RADIANS_PERIOD: f64 = TAU;
/// Wrap period for phase expressed in degrees.
pub const DEGREES_PERIOD: f64 = 360.0;

/// Unwraps phase in place so consecutive samples differ by at most `period / 2`.
pub fn unwrap_phase_in_place(data: &mut [f64], period: f64) {
    let half = period / 2.0;
    let mut offset = 0.0;
    for i in 1..data.len() {
        let mut step = data[i] + offset - data[i - 1];
        // Leave steps already inside the half period alone so unwrapping twice is a no-op.
        if step.abs() > half {
            offset -= (step / period).round() * period;
            step = data[i] + offset - data[i - 1];
            // round() can land on the wrong side of a tie by one ulp.
            if step > half {
                offset -= period;
            } else if step < -half {
                offset += period;
            }
        }
        data[i] += offset;
    }
}

pub fn unwrap_phase(data: &[f64], period: f64) -> Vec<f64> {
    let mut out = data.to_vec();
    unwrap_phase_in_place(&mut out, period);
    out
}

/// Non-overlapping mean of `k` consecutive samples. A trailing partial group is dropped.
pub fn boxcar_average(data: &[f64], k: usize) -> Result<Vec<f64>> {
    if k == 0 {
        return Err(StabilityError::InvalidSampling(
            "averaging length must be at least 1".into(),
        ));
    }
    if k == 1 {
        return Ok(data.to_vec());
    }
    let view = ArrayView1::from(data);
    Ok(view
        .exact_chunks(k)
        .into_iter()
        .map(|group| group.sum() / k as f64)
        .collect())
}

pub fn mean(data: &[f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(StabilityError::SeriesTooShort {
            required: 1,
            actual: 0,
        });
    }
    Ok(ArrayView1::from(data).sum() / data.len() as f64)
}

/// Scales every sample by `1 / mean(data)`.
pub fn mean_normalize(data: &[f64]) -> Result<Vec<f64>> {
    let mean = mean(data)?;
    if mean == 0.0 {
        return Err(StabilityError::NonPositiveMean);
    }
    Ok(data.iter().map(|v| v / mean).collect())
}
