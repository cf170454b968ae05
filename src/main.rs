use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use serde_json::json;

use frontend_stability::analysis::{
    convert, render_trace_png, DataKind, MemoryProvider, PlotStyle, Series, SeriesId,
    SeriesProvider, StabilityPipeline, TagMap, Units,
};
use frontend_stability::config::AnalysisConfig;
use frontend_stability::synth::{self, SignalGen};

const SAMPLES: usize = 8192;

fn tags(pairs: &[(&str, &str)]) -> TagMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn store(
    provider: &mut MemoryProvider,
    mut series: Series,
    pairs: &[(&str, &str)],
) -> Result<SeriesId> {
    let id = provider.store(&mut series)?;
    provider.append_tags(id, &tags(pairs))?;
    Ok(id)
}

/// Bench simulation: detector power, LO phase and IF voltage channels.
fn simulate(provider: &mut MemoryProvider) -> Result<(Vec<SeriesId>, SeriesId)> {
    let power_mw = synth::white_noise(SAMPLES, 1e-3, 1.0, 1);
    let power_dbm = convert(&power_mw, Units::MilliWatts, Units::Dbm, None)?;
    let power = Series::from_samples(DataKind::Power, Units::Dbm, 0.05, power_dbm)?;
    let power_id = store(provider, power, &[("DATA_KIND", "POWER"), ("UNITS", "DBM")])?;

    let jitter = synth::white_noise(SAMPLES, 0.5, 0.0, 2);
    let phase: Vec<f64> = synth::wrapped_phase_ramp(SAMPLES, 7.0)
        .iter()
        .zip(&jitter)
        .map(|(p, j)| p + j)
        .collect();
    let phase = Series::from_samples(DataKind::Phase, Units::Degrees, 0.05, phase)?;
    let phase_id = store(
        provider,
        phase,
        &[("DATA_KIND", "PHASE"), ("RF_GHZ", "100"), ("LO_GHZ", "12")],
    )?;

    let if_gen = SignalGen {
        freq_hz: 60.0,
        amplitude: 1e-3,
        mean: 0.0,
        noise_sigma: 1e-4,
    };
    let voltage = Series::from_samples(
        DataKind::Voltage,
        Units::Volts,
        1e-3,
        if_gen.generate(SAMPLES, 1e-3, 3),
    )?;
    let voltage_id = store(provider, voltage, &[("DATA_KIND", "VOLTAGE"), ("BENCH", "sim")])?;

    Ok((vec![power_id, phase_id, voltage_id], voltage_id))
}

fn main() -> Result<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => AnalysisConfig::from_file(&PathBuf::from(path))?,
        None => AnalysisConfig::default(),
    };
    let plot_path = args.next().map(PathBuf::from);

    let mut provider = MemoryProvider::new();
    let (ids, spectrum_id) = simulate(&mut provider)?;
    let pipeline = StabilityPipeline::new(provider, config.settings()?);

    let report = pipeline.analyze_all(&ids);
    let spectrum = pipeline.analyze_spectrum(spectrum_id)?;
    info!(
        "{} traces, {} skipped, overall {}",
        report.records.len(),
        report.skipped.len(),
        report.status
    );

    if let Some(path) = plot_path {
        let png = render_trace_png(&report.records, PlotStyle::log_log())?;
        std::fs::write(&path, png)
            .with_context(|| format!("Failed to write plot: {}", path.display()))?;
    }

    let skipped: Vec<_> = report
        .skipped
        .iter()
        .map(|s| json!({ "id": s.id, "error": s.error.to_string() }))
        .collect();
    let output = json!({
        "status": report.status,
        "records": report.records,
        "skipped": skipped,
        "spectrum": {
            "rms": spectrum.rms,
            "rmsPass": spectrum.rms_pass,
            "limitPass": spectrum.limit_pass,
            "record": spectrum.record,
        },
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
