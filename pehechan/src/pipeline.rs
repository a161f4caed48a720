// THEORY:
// The `pipeline` module is the top-level API of the analysis engine. It wraps
// the slow, external face model in a thin sequential pipeline so that callers
// hand over one captured frame plus a list of wanted features and receive
// either a finished report or one plain-language error.
//
//   Idle -> Validating -> Preprocessing -> Detecting -> Formatting -> Done
//                  \____________\______________\____________\______-> Error
//
// No stage lets an error escape as a panic: the gate and preprocessing run on the
// blocking pool and a crash there is reported as a validation error, model
// failures arrive as typed `ModelError`s, and malformed model output is a
// generic analysis failure.

use crate::core_modules::face_selection::{detection_confidence, select_best_face};
use crate::core_modules::feature_formatter::{
    AgeResult, Feature, FeatureReport, ScoredResult, capitalize, format_emotion_display, format_race_display,
    round2, supported_features,
};
use crate::core_modules::frame::Frame;
use crate::core_modules::model::{AnalyzeRequest, DEFAULT_DETECTOR_BACKEND, FaceAnalyzer, ModelError};
use crate::core_modules::normalizer::normalize_map;
use crate::core_modules::preprocess::preprocess;
use crate::core_modules::quality_gate::{QualityConfig, QualityGate, QualityIssue};
use crate::error::AnalysisError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Configuration for the AnalysisPipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quality: QualityConfig,
    /// Face detector the model is asked to use.
    pub detector_backend: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality: QualityConfig::default(),
            detector_backend: DEFAULT_DETECTOR_BACKEND.to_string(),
        }
    }
}

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    Preprocessing,
    Detecting,
    Formatting,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Validating => "validating",
            Stage::Preprocessing => "preprocessing",
            Stage::Detecting => "detecting",
            Stage::Formatting => "formatting",
            Stage::Done => "done",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

/// Facts about how the report was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    /// Seconds from pipeline entry to report, two decimals.
    pub processing_time: f64,
    /// Bounding box of the analyzed face, `{}` when the model gave none.
    pub face_region: Value,
    /// Area-based proxy, see `face_selection`.
    pub detection_confidence: f64,
}

/// The successful output of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub data: FeatureReport,
    pub metadata: ReportMetadata,
}

/// The `{success, ...}` envelope every request ends in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Success {
        success: bool,
        data: FeatureReport,
        metadata: ReportMetadata,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success { .. })
    }
}

impl From<Result<AnalysisReport, AnalysisError>> for AnalysisOutcome {
    fn from(result: Result<AnalysisReport, AnalysisError>) -> Self {
        match result {
            Ok(report) => AnalysisOutcome::Success {
                success: true,
                data: report.data,
                metadata: report.metadata,
            },
            Err(err) => AnalysisOutcome::Failure {
                success: false,
                error: err.to_string(),
            },
        }
    }
}

/// Label scores as they arrive after normalization; a non-finite score is `null`.
type ScoreMap = IndexMap<String, Option<f64>>;

/// The fields the formatter reads from a normalized face result.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FaceAttributes {
    age: Option<f64>,
    gender: Option<ScoreMap>,
    dominant_gender: Option<String>,
    emotion: Option<ScoreMap>,
    dominant_emotion: Option<String>,
    race: Option<ScoreMap>,
    dominant_race: Option<String>,
}

fn enter(stage: &mut Stage, next: Stage) {
    tracing::debug!(from = %stage, to = %next, "pipeline stage");
    *stage = next;
}

/// Runs CPU-bound frame work on the blocking pool. A task that panics or is
/// cancelled becomes a `ValidationError` instead of unwinding into the caller.
async fn off_worker<T, F>(work: F) -> Result<T, QualityIssue>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| QualityIssue::ValidationError(e.to_string()))
}

fn missing(field: &str) -> ModelError {
    ModelError::Failed(format!("model output is missing '{field}'"))
}

fn scored_feature(
    feature: Feature,
    dominant: Option<&String>,
    scores: Option<&ScoreMap>,
    display: fn(&str) -> String,
) -> Result<ScoredResult, ModelError> {
    let dominant_key = format!("dominant_{feature}");
    let dominant = dominant.ok_or_else(|| missing(&dominant_key))?;
    let scores = scores.ok_or_else(|| missing(feature.as_str()))?;

    let finite: IndexMap<String, f64> = scores
        .iter()
        .filter_map(|(label, score)| score.map(|score| (label.clone(), score)))
        .collect();
    if finite.len() < scores.len() {
        tracing::debug!(%feature, dropped = scores.len() - finite.len(), "ignoring non-finite scores");
    }

    ScoredResult::build(dominant, &finite, display)
        .ok_or_else(|| ModelError::Failed(format!("no {feature} score for dominant label '{dominant}'")))
}

/// The main, top-level struct for the analysis engine.
pub struct AnalysisPipeline {
    gate: QualityGate,
    analyzer: Arc<dyn FaceAnalyzer>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(config: PipelineConfig, analyzer: Arc<dyn FaceAnalyzer>) -> Self {
        Self {
            gate: QualityGate::new(config.quality.clone()),
            analyzer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline and wraps the result in the `{success, ...}` envelope.
    pub async fn analyze_outcome<S: AsRef<str>>(&self, frame: Frame, requested: &[S]) -> AnalysisOutcome {
        self.analyze(frame, requested).await.into()
    }

    pub async fn analyze<S: AsRef<str>>(&self, frame: Frame, requested: &[S]) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        let mut stage = Stage::Idle;

        let result = self.run(frame, requested, started, &mut stage).await;
        match &result {
            Ok(report) => tracing::info!(
                processing_time = report.metadata.processing_time,
                detection_confidence = report.metadata.detection_confidence,
                "facial analysis complete"
            ),
            Err(err) => {
                tracing::warn!(%stage, kind = ?err.kind(), error = %err, "facial analysis failed");
                enter(&mut stage, Stage::Error);
            }
        }
        result
    }

    async fn run<S: AsRef<str>>(
        &self,
        frame: Frame,
        requested: &[S],
        started: Instant,
        stage: &mut Stage,
    ) -> Result<AnalysisReport, AnalysisError> {
        let features = supported_features(requested);
        if features.is_empty() {
            return Err(AnalysisError::NoValidFeatures);
        }
        tracing::info!(?features, "analyzing features");

        // Stage 1: Quality gate, off the async workers.
        enter(stage, Stage::Validating);
        let gate = self.gate.clone();
        let frame = off_worker(move || gate.check(Some(&frame)).map(|_| frame)).await??;

        // Stage 2: Channel order for the model.
        enter(stage, Stage::Preprocessing);
        let frame = off_worker(move || preprocess(&frame)).await?;

        // Stage 3: External detection + classification.
        enter(stage, Stage::Detecting);
        let request = AnalyzeRequest::new(frame, features.clone(), self.config.detector_backend.clone());
        let faces = self.analyzer.analyze(request).await?;
        let face = select_best_face(&faces).ok_or(ModelError::NoFacesReturned)?;
        if faces.len() > 1 {
            tracing::debug!(count = faces.len(), "multiple faces detected, keeping the largest");
        }

        // Stage 4: Shape the report.
        enter(stage, Stage::Formatting);
        let normalized = normalize_map(face);
        let face_region = match normalized.get("region") {
            Some(region @ Value::Object(_)) => region.clone(),
            _ => Value::Object(Map::new()),
        };
        let attributes: FaceAttributes = serde_json::from_value(Value::Object(normalized))
            .map_err(|e| ModelError::Failed(format!("malformed face result: {e}")))?;

        let mut data = FeatureReport::default();
        for feature in &features {
            match feature {
                Feature::Age => {
                    let estimate = attributes.age.ok_or_else(|| missing("age"))?;
                    data.age = Some(AgeResult::from_estimate(estimate));
                }
                Feature::Gender => {
                    data.gender = Some(scored_feature(
                        *feature,
                        attributes.dominant_gender.as_ref(),
                        attributes.gender.as_ref(),
                        capitalize,
                    )?);
                }
                Feature::Emotion => {
                    data.emotion = Some(scored_feature(
                        *feature,
                        attributes.dominant_emotion.as_ref(),
                        attributes.emotion.as_ref(),
                        format_emotion_display,
                    )?);
                }
                Feature::Race => {
                    data.race = Some(scored_feature(
                        *feature,
                        attributes.dominant_race.as_ref(),
                        attributes.race.as_ref(),
                        format_race_display,
                    )?);
                }
            }
        }

        let metadata = ReportMetadata {
            processing_time: round2(started.elapsed().as_secs_f64()),
            face_region,
            detection_confidence: detection_confidence(face),
        };

        enter(stage, Stage::Done);
        Ok(AnalysisReport { data, metadata })
    }
}
