pub mod analysis;
pub mod config;
pub mod synth;

pub use analysis::{StabilityError, StabilityPipeline};
pub use config::AnalysisConfig;
