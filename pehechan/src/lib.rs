// THEORY:
// This file is the main entry point for the `pehechan` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `pehechan_web` server).
//
// The primary goal is to export the `AnalysisPipeline` and its associated data
// structures (`PipelineConfig`, `AnalysisReport`, etc.) as the clean, high-level
// interface for the analysis engine. The building blocks in `core_modules`
// stay public so a caller can run the quality gate or the formatter on its own,
// but the pipeline is the intended front door.

pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use core_modules::deepface_client::DeepFaceClient;
pub use core_modules::feature_formatter::{Feature, FeatureReport};
pub use core_modules::frame::{ChannelOrder, Frame};
pub use core_modules::model::{AnalyzeRequest, FaceAnalyzer, ModelError};
pub use core_modules::normalizer::{ModelValue, normalize};
pub use core_modules::quality_gate::{QualityConfig, QualityGate, QualityIssue, ValidationResult};
pub use error::{AnalysisError, ErrorKind};
pub use pipeline::{AnalysisOutcome, AnalysisPipeline, AnalysisReport, PipelineConfig, ReportMetadata, Stage};
