pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod state;

pub use config::{PipelineConfig, RotationMethod};
pub use error::{PipelineError, Result};
pub use state::{normalise_and_suggest, AnalysisReport, NormalisationReport, Pipeline};
