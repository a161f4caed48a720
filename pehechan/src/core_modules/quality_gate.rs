// THEORY:
// The `QualityGate` is a cheap, pre-analysis filter. The face model is slow and
// its failure messages are opaque, so obviously unsuitable captures (tiny,
// underexposed, overexposed, shaken) are rejected here with an actionable hint
// before any model time is spent.
//
// The checks run in a fixed order and the first failure wins:
//   format -> resolution -> brightness -> sharpness
// Resolution is checked before any pixel is read, so a thumbnail never pays for
// the grayscale projection or the Laplacian pass.

use crate::core_modules::frame::{Frame, laplacian_variance, mean_intensity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunable thresholds for the gate. Defaults match the capture setup the
/// browser client expects (640x480 webcam, indoor lighting).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum width and height in pixels.
    pub min_dimension: u32,
    /// Mean grayscale intensity below which the image is too dark.
    pub min_brightness: f64,
    /// Mean grayscale intensity above which the image is too bright.
    pub max_brightness: f64,
    /// Minimum variance of the Laplacian response.
    pub min_sharpness: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_dimension: 200,
            min_brightness: 40.0,
            max_brightness: 215.0,
            min_sharpness: 20.0,
        }
    }
}

/// Why a frame was turned away.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityIssue {
    #[error("No image provided")]
    MissingImage,
    #[error("Invalid image format")]
    InvalidFormat,
    #[error("Image resolution too low for accurate analysis")]
    ResolutionTooLow,
    #[error("Image too dark. Please improve lighting")]
    TooDark,
    #[error("Image too bright. Please reduce lighting")]
    TooBright,
    #[error("Image too blurry. Please hold camera steady")]
    TooBlurry,
    #[error("Image validation error: {0}")]
    ValidationError(String),
}

impl QualityIssue {
    /// True for the two flavours of bad input (absent / malformed), as opposed
    /// to a well-formed image of poor quality.
    pub fn is_input_error(&self) -> bool {
        matches!(self, QualityIssue::MissingImage | QualityIssue::InvalidFormat)
    }
}

/// Result of a single gate pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
}

impl From<Result<(), QualityIssue>> for ValidationResult {
    fn from(result: Result<(), QualityIssue>) -> Self {
        match result {
            Ok(()) => Self { valid: true, error: None },
            Err(issue) => Self {
                valid: false,
                error: Some(issue.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Runs every check and reports the outcome in the portable
    /// `{valid, error}` shape.
    pub fn validate(&self, frame: Option<&Frame>) -> ValidationResult {
        self.check(frame).into()
    }

    /// Same checks as [`validate`](Self::validate), keeping the typed issue.
    pub fn check(&self, frame: Option<&Frame>) -> Result<(), QualityIssue> {
        let frame = frame.ok_or(QualityIssue::MissingImage)?;

        if frame.shape().len() < 2 || !matches!(frame.channels, 1 | 3) {
            return Err(QualityIssue::InvalidFormat);
        }

        if frame.width < self.config.min_dimension || frame.height < self.config.min_dimension {
            return Err(QualityIssue::ResolutionTooLow);
        }

        if frame.data.len() != frame.expected_len() {
            return Err(QualityIssue::ValidationError(format!(
                "buffer holds {} bytes but a {}x{}x{} frame needs {}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.channels,
                frame.expected_len()
            )));
        }

        let gray = frame.to_grayscale();
        let brightness = mean_intensity(&gray);
        if brightness < self.config.min_brightness {
            return Err(QualityIssue::TooDark);
        }
        if brightness > self.config.max_brightness {
            return Err(QualityIssue::TooBright);
        }

        let sharpness = laplacian_variance(&gray, frame.width as usize, frame.height as usize);
        tracing::debug!(brightness, sharpness, "quality gate measurements");
        if sharpness < self.config.min_sharpness {
            return Err(QualityIssue::TooBlurry);
        }

        Ok(())
    }
}
