use log::debug;
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::analysis::error::{Result, StabilityError};
use crate::analysis::trace::Trace;

/// Fraction of a bin width under which a bin centre counts as sitting on a band edge.
const EDGE_TOLERANCE: f64 = 1e-6;

/// One-sided amplitude spectrum of a real series.
#[derive(Clone, Debug)]
pub struct FrequencySpectrum {
    pub bin_width_hz: f64,
    pub frequencies_hz: Vec<f64>,
    pub magnitudes: Vec<f64>, // k = 0 ..= N/2, non-DC bins doubled
}

/// Bins near integer multiples of a fundamental, excluded from RMS sums.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarmonicMask {
    #[serde(default, alias = "fundamentalHz")]
    pub fundamental_hz: u32,
    #[serde(default = "default_window_hz", alias = "windowHz")]
    pub window_hz: f64,
}

fn default_window_hz() -> f64 {
    3.0
}

impl Default for HarmonicMask {
    fn default() -> Self {
        Self {
            fundamental_hz: 0,
            window_hz: default_window_hz(),
        }
    }
}

impl HarmonicMask {
    pub fn new(fundamental_hz: u32, window_hz: f64) -> Self {
        Self {
            fundamental_hz,
            window_hz,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.fundamental_hz > 0
    }

    /// True when `freq_hz` lies within the window of a positive harmonic.
    ///
    /// Only the harmonic at or below the bin, the one above it and the one below
    /// that are tested.
    pub fn masks(&self, freq_hz: f64) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let f0 = self.fundamental_hz as f64;
        let below = (freq_hz / f0).floor();
        [below - 1.0, below, below + 1.0]
            .into_iter()
            .filter(|h| *h >= 1.0)
            .any(|h| (freq_hz - h * f0).abs() <= self.window_hz)
    }
}

/// Options for [`FrequencySpectrum::rms_in_band`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RmsOptions {
    pub include_dc: bool,
    pub mask: Option<HarmonicMask>,
}

/// Computes one-sided amplitude spectra at a fixed sample interval.
pub struct SpectrumBuilder {
    tau0: f64,
}

impl SpectrumBuilder {
    pub fn with_interval(tau0: f64) -> Result<Self> {
        if !(tau0 > 0.0) {
            return Err(StabilityError::InvalidSampling(format!(
                "tau0 must be positive, got {tau0}"
            )));
        }
        Ok(Self { tau0 })
    }

    pub fn compute(&self, data: &[f64]) -> Result<FrequencySpectrum> {
        let n = data.len();
        if n < 1 {
            return Err(StabilityError::InvalidSampling(
                "spectrum needs at least one sample".into(),
            ));
        }
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        let mut buffer: Vec<Complex64> = data.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        fft.process(&mut buffer);

        let bin_width_hz = 1.0 / (n as f64 * self.tau0);
        let bins = n / 2 + 1;
        let frequencies_hz = (0..bins).map(|k| k as f64 * bin_width_hz).collect();
        let magnitudes = buffer
            .iter()
            .take(bins)
            .enumerate()
            .map(|(k, c)| {
                let amplitude = c.norm() / n as f64;
                if k == 0 {
                    amplitude
                } else {
                    2.0 * amplitude
                }
            })
            .collect();
        Ok(FrequencySpectrum {
            bin_width_hz,
            frequencies_hz,
            magnitudes,
        })
    }
}

impl FrequencySpectrum {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.frequencies_hz.last().copied().unwrap_or(0.0)
    }

    pub fn to_trace(&self) -> Trace {
        let mut trace = Trace::with_capacity(self.len());
        for (f, y) in self.frequencies_hz.iter().zip(&self.magnitudes) {
            trace.push(*f, *y, 0.0);
        }
        trace
    }

    /// Bin indices whose centre lies in `[f_lo, f_hi]`.
    fn band(&self, f_lo: f64, f_hi: f64) -> impl Iterator<Item = usize> + '_ {
        let tol = self.bin_width_hz * EDGE_TOLERANCE;
        self.frequencies_hz
            .iter()
            .enumerate()
            .filter(move |(_, f)| **f >= f_lo - tol && **f <= f_hi + tol)
            .map(|(k, _)| k)
    }

    /// RMS of the spectrum between `f_lo` and `f_hi`.
    ///
    /// Bins sitting exactly on a band edge carry half their linear amplitude
    /// (a quarter of their power). The DC bin is skipped unless
    /// `include_dc` is set, in which case it is added linearly after the root.
    pub fn rms_in_band(&self, f_lo: f64, f_hi: f64, options: RmsOptions) -> f64 {
        let tol = self.bin_width_hz * EDGE_TOLERANCE;
        let mut sum = 0.0;
        let mut masked = 0usize;
        let mut dc = 0.0;
        for k in self.band(f_lo, f_hi) {
            let f = self.frequencies_hz[k];
            let y = self.magnitudes[k];
            if k == 0 {
                if options.include_dc {
                    dc = y;
                }
                continue;
            }
            if options.mask.is_some_and(|m| m.masks(f)) {
                masked += 1;
                continue;
            }
            let on_edge = (f - f_lo).abs() <= tol || (f - f_hi).abs() <= tol;
            let weight = if on_edge { 0.25 } else { 1.0 };
            let rms = y / std::f64::consts::SQRT_2;
            sum += rms * rms * weight;
        }
        if masked > 0 {
            debug!("harmonic mask excluded {masked} bins between {f_lo} and {f_hi} Hz");
        }
        sum.sqrt() + dc
    }

    /// Largest magnitude in `[f_lo, f_hi]`, `None` if no bin falls in the band.
    pub fn max_in_band(&self, f_lo: f64, f_hi: f64) -> Option<f64> {
        self.band(f_lo, f_hi)
            .map(|k| self.magnitudes[k])
            .reduce(f64::max)
    }

    /// True iff no magnitude in `[f_lo, f_hi]` exceeds `limit`.
    pub fn spec_check(&self, f_lo: f64, f_hi: f64, limit: f64) -> bool {
        self.max_in_band(f_lo, f_hi).map_or(true, |max| max <= limit)
    }
}
