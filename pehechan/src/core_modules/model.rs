// THEORY:
// Face detection, alignment and attribute classification are delegated to an
// external pretrained model. This module is the seam: a request type, a trait,
// and an error type. Everything on the other side (HTTP service, in-process
// runtime, test double) is an implementation detail of `FaceAnalyzer`.

use crate::core_modules::face_selection::RawFace;
use crate::core_modules::feature_formatter::Feature;
use crate::core_modules::frame::Frame;
use async_trait::async_trait;
use thiserror::Error;

pub const DEFAULT_DETECTOR_BACKEND: &str = "retinaface";

/// Everything the model needs for one analysis call.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    /// An RGB frame.
    pub frame: Frame,
    /// Only these attributes are estimated.
    pub actions: Vec<Feature>,
    /// Fail instead of analyzing the whole image when no face is found.
    pub enforce_detection: bool,
    /// Align detected faces on the eye line before classification.
    pub align: bool,
    /// Name of the face detector the model should use.
    pub detector_backend: String,
}

impl AnalyzeRequest {
    pub fn new(frame: Frame, actions: Vec<Feature>, detector_backend: impl Into<String>) -> Self {
        Self {
            frame,
            actions,
            enforce_detection: true,
            align: true,
            detector_backend: detector_backend.into(),
        }
    }
}

/// Failures reported by the model boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("No face detected. Please ensure your face is clearly visible, well-lit, and facing the camera.")]
    NoFaceDetected,
    /// The model ran but returned an empty result list.
    #[error("No faces detected. Please ensure your face is clearly visible and well-lit.")]
    NoFacesReturned,
    #[error("Invalid or corrupted image. Please try capturing again.")]
    InvalidImage,
    #[error("Insufficient memory for analysis. Please try again.")]
    OutOfMemory,
    #[error("Analysis failed: {0}")]
    Failed(String),
}

impl ModelError {
    /// Classifies a free-form model failure message.
    ///
    /// Best effort only: the model reports failures as prose, so this matches
    /// substrings of the wording it uses today. A rephrased message degrades to
    /// `Failed` carrying the original text.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if message.contains("No face") || message.contains("Face could not be detected") {
            ModelError::NoFaceDetected
        } else if message.contains("Invalid image") || lower.contains("corrupted") {
            ModelError::InvalidImage
        } else if lower.contains("memory") {
            ModelError::OutOfMemory
        } else {
            ModelError::Failed(message.to_string())
        }
    }
}

/// A pretrained face-attribute model.
#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    /// Detects faces and estimates the requested attributes for each one.
    async fn analyze(&self, request: AnalyzeRequest) -> Result<Vec<RawFace>, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_failures_are_recognised() {
        assert_eq!(
            ModelError::from_message("Face could not be detected in numpy array. Please confirm..."),
            ModelError::NoFaceDetected
        );
        assert_eq!(ModelError::from_message("No face found"), ModelError::NoFaceDetected);
    }

    #[test]
    fn image_and_memory_failures_are_recognised() {
        assert_eq!(ModelError::from_message("Invalid image input"), ModelError::InvalidImage);
        assert_eq!(ModelError::from_message("JPEG data CORRUPTED"), ModelError::InvalidImage);
        assert_eq!(ModelError::from_message("CUDA out of Memory"), ModelError::OutOfMemory);
    }

    #[test]
    fn unknown_failures_keep_the_original_text() {
        let err = ModelError::from_message("weights file missing");
        assert_eq!(err.to_string(), "Analysis failed: weights file missing");
    }

    #[test]
    fn requests_enforce_detection_and_alignment() {
        let request = AnalyzeRequest::new(Frame::gray(1, 1, vec![0]), vec![Feature::Age], DEFAULT_DETECTOR_BACKEND);
        assert!(request.enforce_detection && request.align);
        assert_eq!(request.detector_backend, "retinaface");
    }
}
