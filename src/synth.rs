//! Deterministic synthetic series for the demo binary and tests.
use std::f64::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Stationary test-bench signal: a tone over Gaussian noise.
#[derive(Clone, Copy, Debug)]
pub struct SignalGen {
    pub freq_hz: f64,
    pub amplitude: f64,
    pub mean: f64,
    pub noise_sigma: f64,
}

impl SignalGen {
    pub fn generate(&self, n: usize, tau0: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let tone = self.amplitude * (TAU * self.freq_hz * i as f64 * tau0).sin();
                self.mean + tone + self.noise_sigma * gaussian(&mut rng)
            })
            .collect()
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

pub fn white_noise(n: usize, sigma: f64, mean: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| mean + sigma * gaussian(&mut rng)).collect()
}

pub fn sine(n: usize, tau0: f64, freq_hz: f64, amplitude: f64) -> Vec<f64> {
    (0..n)
        .map(|i| amplitude * (TAU * freq_hz * i as f64 * tau0).sin())
        .collect()
}

/// Phase in degrees advancing `step_deg` per sample, wrapped into `(-180, 180]`.
pub fn wrapped_phase_ramp(n: usize, step_deg: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let phase = (i as f64 * step_deg).rem_euclid(360.0);
            if phase > 180.0 {
                phase - 360.0
            } else {
                phase
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_reproducible_per_seed() {
        let a = white_noise(1000, 2.0, 5.0, 11);
        assert_eq!(a, white_noise(1000, 2.0, 5.0, 11));
        assert_ne!(a, white_noise(1000, 2.0, 5.0, 12));
        let mean = a.iter().sum::<f64>() / a.len() as f64;
        assert!((mean - 5.0).abs() < 0.3);
    }

    #[test]
    fn ramp_wraps_at_half_turn() {
        assert_eq!(
            wrapped_phase_ramp(6, 90.0),
            vec![0.0, 90.0, 180.0, -90.0, 0.0, 90.0]
        );
    }

    #[test]
    fn generator_without_noise_is_a_sine() {
        let gen = SignalGen {
            freq_hz: 5.0,
            amplitude: 2.0,
            mean: 1.0,
            noise_sigma: 0.0,
        };
        let expected: Vec<f64> = sine(64, 0.01, 5.0, 2.0).iter().map(|v| v + 1.0).collect();
        assert_eq!(gen.generate(64, 0.01, 0), expected);
    }
}
