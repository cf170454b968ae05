use thiserror::Error;

use crate::analysis::units::Units;

#[derive(Debug, Error)]
pub enum StabilityError {
    #[error("series too short: need at least {required} points, got {actual}")]
    SeriesTooShort { required: usize, actual: usize },
    #[error("invalid sampling: {0}")]
    InvalidSampling(String),
    #[error("unsupported conversion from {from} to {to}")]
    UnsupportedConversion { from: Units, to: Units },
    #[error("normalization divisor is zero")]
    NonPositiveMean,
    #[error("no known timestamp format matches {0:?}")]
    UnknownTimestampFormat(String),
    #[error("missing reference: {0}")]
    MissingReference(&'static str),
    #[error("parallel sequence length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid spec string {0:?}")]
    InvalidSpec(String),
    #[error("unknown {kind} value {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
    #[error("no series stored under id {0}")]
    SeriesNotFound(u64),
    #[error("failed to render plot: {0}")]
    Plot(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for StabilityError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        StabilityError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for StabilityError {
    fn from(value: image::ImageError) -> Self {
        StabilityError::Plot(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StabilityError>;
