//! Stability analysis of front-end test-bench series.
pub mod allan;
pub mod error;
pub mod fft;
pub mod pipeline;
pub mod plot;
pub mod preprocess;
pub mod provider;
pub mod series;
pub mod spec;
pub mod trace;
pub mod units;

pub use allan::{
    allan_deviation, allan_variance, identify_noise_type, AdevOptions, AllanMode, AvarOptions,
    NoiseType, TauRange,
};
pub use error::{Result, StabilityError};
pub use fft::{FrequencySpectrum, HarmonicMask, RmsOptions, SpectrumBuilder};
pub use pipeline::{
    AllanSettings, BatchReport, PipelineSettings, SkippedSeries, SpectrumReport, SpectrumSettings,
    StabilityPipeline,
};
pub use plot::{render_trace_png, PlotStyle};
pub use preprocess::{boxcar_average, mean_normalize, unwrap_phase, unwrap_phase_in_place};
pub use provider::{MemoryProvider, SeriesId, SeriesProvider, Tag, TagMap};
pub use series::{Series, Timestamp, TimestampParser};
pub use spec::{RmsSpec, SpecLine, XRange};
pub use trace::{DataStatus, Trace, TracePoint, TraceRecord};
pub use units::{convert, convert_time, DataKind, Units};
