//! TOML configuration for an analysis run.
//!
//! ```toml
//! [allan]
//! tau_range = "1, 1000"
//! spec_lines = ["1, 1e-6, 100, 1e-6"]
//! phase_in_fs = false
//!
//! [spectrum]
//! x_range = "0, 500"
//! rms_spec = "10, 500, 0.1"
//! limit_spec = "55, 65, 0.05"
//! include_dc = false
//!
//! [harmonic_mask]
//! fundamental_hz = 60
//! window_hz = 3.0
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::analysis::allan::TauRange;
use crate::analysis::error::StabilityError;
use crate::analysis::fft::HarmonicMask;
use crate::analysis::pipeline::{AllanSettings, PipelineSettings, SpectrumSettings};
use crate::analysis::spec::{RmsSpec, SpecLine, XRange};

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub allan: AllanConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub harmonic_mask: HarmonicMask,
}

#[derive(Debug, Default, Deserialize)]
pub struct AllanConfig {
    /// `"TMin, TMax"` in seconds. Unset means the whole series.
    pub tau_range: Option<String>,
    #[serde(default)]
    pub spec_lines: Vec<String>,
    #[serde(default)]
    pub phase_in_fs: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpectrumConfig {
    pub x_range: Option<String>,
    pub rms_spec: Option<String>,
    /// `"fLo, fHi, yMax"`: no magnitude in the band may exceed `yMax`.
    pub limit_spec: Option<String>,
    #[serde(default)]
    pub include_dc: bool,
}

fn parse_opt<T>(raw: &Option<String>) -> Result<Option<T>, StabilityError>
where
    T: std::str::FromStr<Err = StabilityError>,
{
    raw.as_deref().map(str::parse).transpose()
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate().context("Invalid analysis configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StabilityError> {
        self.settings().map(|_| ())
    }

    /// Resolves the spec strings into typed pipeline settings.
    pub fn settings(&self) -> Result<PipelineSettings, StabilityError> {
        let tau_range = match parse_opt::<XRange>(&self.allan.tau_range)? {
            Some(range) => TauRange::new(range.min, range.max)?,
            None => TauRange::full(),
        };
        let spec_lines = self
            .allan
            .spec_lines
            .iter()
            .map(|line| line.parse::<SpecLine>())
            .collect::<Result<Vec<_>, _>>()?;
        if self.harmonic_mask.window_hz < 0.0 {
            return Err(StabilityError::InvalidSpec(format!(
                "harmonic window {} Hz",
                self.harmonic_mask.window_hz
            )));
        }

        Ok(PipelineSettings {
            allan: AllanSettings {
                tau_range,
                spec_lines,
                phase_in_fs: self.allan.phase_in_fs,
            },
            spectrum: SpectrumSettings {
                x_range: parse_opt::<XRange>(&self.spectrum.x_range)?,
                rms_spec: parse_opt::<RmsSpec>(&self.spectrum.rms_spec)?,
                limit_spec: parse_opt::<RmsSpec>(&self.spectrum.limit_spec)?,
                include_dc: self.spectrum.include_dc,
                harmonic_mask: self.harmonic_mask,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [allan]
            tau_range = "1, 1000"
            spec_lines = ["1, 1e-6, 100, 1e-6", "500, 2e-6, 500, 2e-6"]
            phase_in_fs = true

            [spectrum]
            x_range = "0, 500"
            rms_spec = "10, 500, 0.1"
            limit_spec = "55, 65, 0.05"

            [harmonic_mask]
            fundamental_hz = 60
        "#;

        let config = AnalysisConfig::from_str(toml).unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.allan.tau_range, TauRange::new(1.0, 1000.0).unwrap());
        assert_eq!(settings.allan.spec_lines.len(), 2);
        assert!(settings.allan.spec_lines[1].is_point());
        assert!(settings.allan.phase_in_fs);
        assert_eq!(settings.spectrum.rms_spec.unwrap().rms_max, 0.1);
        assert_eq!(settings.spectrum.limit_spec.unwrap().f_lo, 55.0);
        assert!(!settings.spectrum.include_dc);
        assert_eq!(settings.spectrum.harmonic_mask, HarmonicMask::new(60, 3.0));
    }

    #[test]
    fn test_empty_config() {
        let config = AnalysisConfig::from_str("").unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.allan.tau_range, TauRange::full());
        assert!(settings.allan.spec_lines.is_empty());
        assert!(settings.spectrum.x_range.is_none());
        assert!(!settings.spectrum.harmonic_mask.is_enabled());
    }

    #[test]
    fn test_bad_spec_strings_are_rejected() {
        let bad_line = r#"
            [allan]
            spec_lines = ["1, 2, 3"]
        "#;
        assert!(AnalysisConfig::from_str(bad_line).is_err());

        let inverted = r#"
            [allan]
            tau_range = "100, 1"
        "#;
        assert!(AnalysisConfig::from_str(inverted).is_err());

        let config: AnalysisConfig = toml::from_str("[spectrum]\nrms_spec = \"10, 5, 1\"").unwrap();
        assert!(matches!(
            config.validate(),
            Err(StabilityError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_camel_case_mask_keys() {
        let toml = r#"
            [harmonic_mask]
            fundamentalHz = 50
            windowHz = 1.5
        "#;
        let config = AnalysisConfig::from_str(toml).unwrap();
        assert_eq!(config.harmonic_mask, HarmonicMask::new(50, 1.5));
    }
}
