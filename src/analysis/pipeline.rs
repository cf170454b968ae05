use log::{info, warn};

use crate::analysis::allan::{
    allan_deviation, allan_variance, identify_noise_type, AdevOptions, AllanMode, AvarOptions,
    NoiseType, TauRange,
};
use crate::analysis::error::{Result, StabilityError};
use crate::analysis::fft::{HarmonicMask, RmsOptions, SpectrumBuilder};
use crate::analysis::preprocess::{DEGREES_PERIOD, RADIANS_PERIOD};
use crate::analysis::provider::{SeriesId, SeriesProvider, Tag, TagMap};
use crate::analysis::series::Series;
use crate::analysis::spec::{RmsSpec, SpecLine, XRange};
use crate::analysis::trace::{DataStatus, Trace, TraceRecord};
use crate::analysis::units::{convert, convert_seconds, DataKind, Units};

#[derive(Clone, Debug)]
pub struct AllanSettings {
    pub tau_range: TauRange,
    pub spec_lines: Vec<SpecLine>,
    /// Report phase ADEV in femtoseconds using the `RF_GHZ` tag.
    pub phase_in_fs: bool,
}

impl Default for AllanSettings {
    fn default() -> Self {
        Self {
            tau_range: TauRange::full(),
            spec_lines: Vec::new(),
            phase_in_fs: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SpectrumSettings {
    /// Frequencies kept on the output trace; also the RMS band when no RMS spec is set.
    pub x_range: Option<XRange>,
    pub rms_spec: Option<RmsSpec>,
    /// Max-in-band limit, `rms_max` read as the largest allowed magnitude.
    pub limit_spec: Option<RmsSpec>,
    pub include_dc: bool,
    pub harmonic_mask: HarmonicMask,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineSettings {
    pub allan: AllanSettings,
    pub spectrum: SpectrumSettings,
}

/// A series the batch could not analyse, with the reason.
#[derive(Debug)]
pub struct SkippedSeries {
    pub id: SeriesId,
    pub error: StabilityError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<TraceRecord>,
    pub skipped: Vec<SkippedSeries>,
    pub status: DataStatus,
}

#[derive(Clone, Debug)]
pub struct SpectrumReport {
    pub record: TraceRecord,
    pub rms: f64,
    pub rms_pass: Option<bool>,
    pub limit_pass: Option<bool>,
}

/// Loads series from a provider and runs the engine their kind calls for.
pub struct StabilityPipeline<P: SeriesProvider> {
    provider: P,
    settings: PipelineSettings,
}

fn tag_value(tags: &TagMap, tag: Tag) -> Option<&str> {
    tags.get(tag.as_str()).map(String::as_str)
}

fn tag_f64(tags: &TagMap, tag: Tag) -> Result<Option<f64>> {
    tag_value(tags, tag)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| StabilityError::UnknownVariant {
                    kind: tag.as_str(),
                    value: raw.to_string(),
                })
        })
        .transpose()
}

fn forwarded(tags: &TagMap) -> TagMap {
    tags.iter()
        .filter(|(name, _)| !Tag::is_well_known(name))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Power read in dBm is analysed in linear milliwatts.
fn linear_units(units: Units) -> Units {
    if units == Units::Dbm {
        Units::MilliWatts
    } else {
        units
    }
}

fn verdict_str(verdict: Option<bool>) -> &'static str {
    match verdict {
        Some(true) => "PASS",
        Some(false) => "FAIL",
        None => "UNKNOWN",
    }
}

impl<P: SeriesProvider> StabilityPipeline<P> {
    pub fn new(provider: P, settings: PipelineSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Allan analysis of one stored series.
    pub fn analyze(&self, id: SeriesId) -> Result<TraceRecord> {
        let series = self.provider.load(id)?;
        let tags = self.provider.get_tags(id, &[])?;
        self.analyze_series(&series, &tags, &format!("series {id}"))
    }

    /// Allan analysis of every id; failures become skipped entries.
    pub fn analyze_all(&self, ids: &[SeriesId]) -> BatchReport {
        let mut report = BatchReport::default();
        for &id in ids {
            match self.analyze(id) {
                Ok(record) => {
                    report.status = report.status.merge(record.data_status);
                    report.records.push(record);
                }
                Err(error) => {
                    warn!("skipping series {id}: {error}");
                    report.skipped.push(SkippedSeries { id, error });
                }
            }
        }
        report
    }

    pub fn analyze_spectrum(&self, id: SeriesId) -> Result<SpectrumReport> {
        let series = self.provider.load(id)?;
        let tags = self.provider.get_tags(id, &[])?;
        self.analyze_spectrum_series(&series, &tags, &format!("series {id}"))
    }

    /// Picks AVAR or ADEV from the data kind and evaluates the configured spec lines.
    pub fn analyze_series(
        &self,
        series: &Series,
        tags: &TagMap,
        name: &str,
    ) -> Result<TraceRecord> {
        let kind = match tag_value(tags, Tag::DataKind) {
            Some(raw) => raw.parse::<DataKind>()?,
            None => series.kind(),
        };
        let units = match tag_value(tags, Tag::Units) {
            Some(raw) => raw.parse::<Units>()?,
            None => series.data_units(),
        };
        let t_units = match tag_value(tags, Tag::TUnits) {
            Some(raw) => raw.parse::<Units>()?,
            None => Units::Seconds,
        };
        let settings = &self.settings.allan;
        let tau0 = series.tau0()?;
        let range = settings.tau_range;

        let (mode, trace, y_units) = match kind {
            DataKind::Amplitude | DataKind::Power => {
                let target = linear_units(units);
                let data = convert(series.data(), units, target, None)?;
                let trace = allan_variance(&data, tau0, range, AvarOptions { normalize: true })?;
                (AllanMode::Avar, trace, Units::Avar)
            }
            DataKind::Voltage => {
                let trace = allan_deviation(series.data(), tau0, range, AdevOptions::default())?;
                (AllanMode::Adev, trace, units)
            }
            DataKind::Gain => {
                let options = AdevOptions {
                    normalize: true,
                    ..Default::default()
                };
                let trace = allan_deviation(series.data(), tau0, range, options)?;
                (AllanMode::Adev, trace, Units::Adev)
            }
            DataKind::Phase => {
                let period = if units == Units::Degrees {
                    DEGREES_PERIOD
                } else {
                    RADIANS_PERIOD
                };
                let mut options = AdevOptions {
                    unwrap_period: Some(period),
                    ..Default::default()
                };
                let mut y_units = units;
                if settings.phase_in_fs {
                    if units != Units::Degrees {
                        return Err(StabilityError::UnsupportedConversion {
                            from: units,
                            to: Units::Femtoseconds,
                        });
                    }
                    let rf_ghz = tag_f64(tags, Tag::RfGhz)?.ok_or(
                        StabilityError::MissingReference("phase in femtoseconds requires RF_GHZ"),
                    )?;
                    options.rf_hz = Some(rf_ghz * 1e9);
                    y_units = Units::Femtoseconds;
                }
                let trace = allan_deviation(series.data(), tau0, range, options)?;
                (AllanMode::Adev, trace, y_units)
            }
        };

        let mut name = name.to_string();
        if let Some(lo) = tag_f64(tags, Tag::LoGhz)? {
            name.push_str(&format!(" LO {lo} GHz"));
        }
        let mut record = TraceRecord::from_trace(name, &trace, t_units, y_units);
        record.x_values = convert_seconds(&record.x_values, t_units)?;
        record.noise_type = Some(identify_noise_type(&trace, mode));
        record.tags = forwarded(tags);
        self.apply_spec_lines(&mut record, &trace);
        info!(
            "{}: {} points of {:?}, {} ({:?} noise)",
            record.name,
            record.len(),
            mode,
            record.data_status,
            record.noise_type.unwrap_or(NoiseType::Unknown)
        );
        Ok(record)
    }

    /// Spec lines are written against tau in seconds, whatever the plotted unit.
    fn apply_spec_lines(&self, record: &mut TraceRecord, trace: &Trace) {
        let lines = &self.settings.allan.spec_lines;
        if lines.is_empty() {
            return;
        }
        let (x, y) = (trace.xs(), trace.ys());
        let mut status = DataStatus::Unknown;
        let mut parts = Vec::with_capacity(lines.len());
        for line in lines {
            let verdict = line.complies(&x, &y);
            status = status.absorb(verdict);
            parts.push(format!("{line} {}", verdict_str(verdict)));
        }
        record.data_status = status;
        record.compliance_string = Some(parts.join("; "));
    }

    pub fn analyze_spectrum_series(
        &self,
        series: &Series,
        tags: &TagMap,
        name: &str,
    ) -> Result<SpectrumReport> {
        let units = match tag_value(tags, Tag::Units) {
            Some(raw) => raw.parse::<Units>()?,
            None => series.data_units(),
        };
        let target = linear_units(units);
        let data = convert(series.data(), units, target, None)?;
        let tau0 = series.tau0()?;
        let spectrum = SpectrumBuilder::with_interval(tau0)?.compute(&data)?;
        let settings = &self.settings.spectrum;

        let (f_lo, f_hi) = match (settings.rms_spec, settings.x_range) {
            (Some(spec), _) => (spec.f_lo, spec.f_hi),
            (None, Some(range)) => (range.min, range.max),
            // Half the sample rate, so an odd-length series has no bin on the upper edge.
            (None, None) => (0.0, 0.5 / tau0),
        };
        let options = RmsOptions {
            include_dc: settings.include_dc,
            mask: settings
                .harmonic_mask
                .is_enabled()
                .then_some(settings.harmonic_mask),
        };
        let rms = spectrum.rms_in_band(f_lo, f_hi, options);
        let rms_pass = settings.rms_spec.map(|spec| rms <= spec.rms_max);
        let limit_pass = settings
            .limit_spec
            .map(|spec| spectrum.spec_check(spec.f_lo, spec.f_hi, spec.rms_max));

        let mut trace = spectrum.to_trace();
        if let Some(range) = settings.x_range {
            trace.points.retain(|p| range.contains(p.x));
        }
        let mut record = TraceRecord::from_trace(name, &trace, Units::Hertz, target);
        record.tags = forwarded(tags);
        record.data_status = DataStatus::Unknown.absorb(rms_pass).absorb(limit_pass);
        let mut parts = vec![format!("RMS {rms:.3e} in [{f_lo}, {f_hi}] Hz")];
        if let Some(spec) = settings.rms_spec {
            parts.push(format!("max {:.3e} {}", spec.rms_max, verdict_str(rms_pass)));
        }
        if let Some(spec) = settings.limit_spec {
            parts.push(format!(
                "peak <= {:.3e} in [{}, {}] Hz {}",
                spec.rms_max,
                spec.f_lo,
                spec.f_hi,
                verdict_str(limit_pass)
            ));
        }
        record.compliance_string = Some(parts.join("; "));
        info!("{}: spectrum RMS {rms:.3e}, {}", record.name, record.data_status);
        Ok(SpectrumReport {
            record,
            rms,
            rms_pass,
            limit_pass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::provider::MemoryProvider;
    use crate::synth;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn store(provider: &mut MemoryProvider, series: Series, pairs: &[(&str, &str)]) -> SeriesId {
        let mut series = series;
        let id = provider.store(&mut series).unwrap();
        provider.append_tags(id, &tags(pairs)).unwrap();
        id
    }

    #[test]
    fn power_in_dbm_is_analysed_in_milliwatts() {
        let mw = synth::white_noise(2000, 0.01, 1.0, 5);
        let dbm = convert(&mw, Units::MilliWatts, Units::Dbm, None).unwrap();
        let mut provider = MemoryProvider::new();
        let series = Series::from_samples(DataKind::Power, Units::Dbm, 1.0, dbm).unwrap();
        let id = store(&mut provider, series, &[]);
        let pipeline = StabilityPipeline::new(provider, PipelineSettings::default());

        let record = pipeline.analyze(id).unwrap();
        let expected = allan_variance(&mw, 1.0, TauRange::full(), AvarOptions::default()).unwrap();
        assert_eq!(record.y_units, Units::Avar);
        assert_eq!(record.len(), expected.len());
        for (got, want) in record.y_values.iter().zip(expected.ys()) {
            assert!((got - want).abs() <= 1e-9 * want.max(1e-12));
        }
        assert!(record.noise_type.is_some());
        assert_eq!(record.data_status, DataStatus::Unknown);
    }

    #[test]
    fn phase_reported_in_femtoseconds() {
        let phase = synth::wrapped_phase_ramp(6, 90.0);
        let mut provider = MemoryProvider::new();
        let series = Series::from_samples(DataKind::Phase, Units::Degrees, 1.0, phase).unwrap();
        let with_rf = store(&mut provider, series.clone(), &[("RF_GHZ", "100")]);
        let without_rf = store(&mut provider, series, &[]);
        let mut settings = PipelineSettings::default();
        settings.allan.phase_in_fs = true;
        let pipeline = StabilityPipeline::new(provider, settings);

        let record = pipeline.analyze(with_rf).unwrap();
        assert_eq!(record.y_units, Units::Femtoseconds);
        let expected = 90.0 * 0.5f64.sqrt() * 1e15 / 360.0 / 100e9;
        assert!((record.y_values[0] - expected).abs() < 1e-6);
        assert!(matches!(
            pipeline.analyze(without_rf),
            Err(StabilityError::MissingReference(_))
        ));
    }

    #[test]
    fn tags_select_kind_and_time_axis() {
        let volts = synth::white_noise(200, 0.1, 0.0, 9);
        let mut provider = MemoryProvider::new();
        let series = Series::from_samples(DataKind::Amplitude, Units::Volts, 0.5, volts).unwrap();
        let id = store(
            &mut provider,
            series,
            &[
                ("DATA_KIND", "VOLTAGE"),
                ("T_UNITS", "MS"),
                ("LO_GHZ", "12.5"),
                ("OPERATOR", "bench 3"),
            ],
        );
        let pipeline = StabilityPipeline::new(provider, PipelineSettings::default());

        let record = pipeline.analyze(id).unwrap();
        assert_eq!(record.y_units, Units::Volts);
        assert_eq!(record.x_units, Units::Milliseconds);
        assert_eq!(record.x_values[0], 500.0);
        assert_eq!(record.name, "series 1 LO 12.5 GHz");
        assert_eq!(record.tags.len(), 1);
        assert_eq!(record.tags["OPERATOR"], "bench 3");
    }

    #[test]
    fn spec_lines_fold_into_status() {
        let noise = synth::white_noise(1000, 0.01, 1.0, 21);
        let series = Series::from_samples(DataKind::Amplitude, Units::Amplitude, 1.0, noise).unwrap();
        let no_tags = TagMap::new();

        let mut settings = PipelineSettings::default();
        settings.allan.spec_lines = vec![
            "1, 1e-2, 10, 1e-2".parse().unwrap(),
            "1e6, 1, 1e7, 1".parse().unwrap(),
        ];
        let pipeline = StabilityPipeline::new(MemoryProvider::new(), settings);
        let record = pipeline.analyze_series(&series, &no_tags, "ch1").unwrap();
        assert_eq!(record.data_status, DataStatus::Pass);
        let text = record.compliance_string.unwrap();
        assert!(text.contains("PASS"));
        assert!(text.contains("UNKNOWN"));

        let mut settings = PipelineSettings::default();
        settings.allan.spec_lines = vec![
            "1, 1e-2, 10, 1e-2".parse().unwrap(),
            "1, 1e-9, 1, 1e-9".parse().unwrap(),
        ];
        let pipeline = StabilityPipeline::new(MemoryProvider::new(), settings);
        let record = pipeline.analyze_series(&series, &no_tags, "ch1").unwrap();
        assert_eq!(record.data_status, DataStatus::Fail);
    }

    #[test]
    fn batch_skips_failures_and_continues() {
        let mut provider = MemoryProvider::new();
        let good = Series::from_samples(
            DataKind::Power,
            Units::MilliWatts,
            1.0,
            synth::white_noise(100, 0.01, 1.0, 1),
        )
        .unwrap();
        let short = Series::from_samples(DataKind::Power, Units::MilliWatts, 1.0, vec![1.0]).unwrap();
        let good_id = store(&mut provider, good, &[]);
        let short_id = store(&mut provider, short, &[]);
        let pipeline = StabilityPipeline::new(provider, PipelineSettings::default());

        let report = pipeline.analyze_all(&[short_id, good_id, 42]);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].id, short_id);
        assert!(matches!(
            report.skipped[0].error,
            StabilityError::SeriesTooShort { .. }
        ));
        assert!(matches!(
            report.skipped[1].error,
            StabilityError::SeriesNotFound(42)
        ));
        assert_eq!(report.status, DataStatus::Unknown);
    }

    #[test]
    fn spectrum_report_checks_rms_and_peak() {
        let tone = synth::sine(1000, 0.001, 40.0, 1.0);
        let series = Series::from_samples(DataKind::Voltage, Units::Volts, 0.001, tone).unwrap();
        let mut settings = PipelineSettings::default();
        settings.spectrum.rms_spec = Some("10, 100, 0.8".parse().unwrap());
        settings.spectrum.limit_spec = Some("30, 50, 0.5".parse().unwrap());
        settings.spectrum.x_range = Some("0, 100".parse().unwrap());
        let pipeline = StabilityPipeline::new(MemoryProvider::new(), settings);

        let report = pipeline
            .analyze_spectrum_series(&series, &TagMap::new(), "tone")
            .unwrap();
        assert!((report.rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert_eq!(report.rms_pass, Some(true));
        assert_eq!(report.limit_pass, Some(false));
        assert_eq!(report.record.data_status, DataStatus::Fail);
        assert_eq!(report.record.x_units, Units::Hertz);
        assert_eq!(report.record.len(), 101);
    }

    #[test]
    fn default_band_rms_matches_time_domain_for_odd_length() {
        let raw = synth::white_noise(999, 0.2, 0.0, 11);
        let mean = raw.iter().sum::<f64>() / raw.len() as f64;
        let centred: Vec<f64> = raw.iter().map(|v| v - mean).collect();
        let expected =
            (centred.iter().map(|v| v * v).sum::<f64>() / centred.len() as f64).sqrt();
        let series = Series::from_samples(DataKind::Voltage, Units::Volts, 0.01, centred).unwrap();
        let pipeline = StabilityPipeline::new(MemoryProvider::new(), PipelineSettings::default());

        let report = pipeline
            .analyze_spectrum_series(&series, &TagMap::new(), "noise")
            .unwrap();
        assert!((report.rms - expected).abs() < 1e-10);
    }
}
