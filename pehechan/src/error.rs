use crate::core_modules::model::ModelError;
use crate::core_modules::quality_gate::QualityIssue;
use thiserror::Error;

/// Every way a single analysis request can end without a report. The display
/// string is the sentence shown to the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("No valid features selected for analysis")]
    NoValidFeatures,
    #[error(transparent)]
    Quality(#[from] QualityIssue),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Coarse failure families, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Quality,
    Detection,
    Model,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::NoValidFeatures => ErrorKind::Input,
            AnalysisError::Quality(issue) if issue.is_input_error() => ErrorKind::Input,
            AnalysisError::Quality(_) => ErrorKind::Quality,
            AnalysisError::Model(ModelError::NoFaceDetected | ModelError::NoFacesReturned) => ErrorKind::Detection,
            AnalysisError::Model(_) => ErrorKind::Model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_pass_through_unchanged() {
        assert_eq!(
            AnalysisError::from(QualityIssue::TooBlurry).to_string(),
            "Image too blurry. Please hold camera steady"
        );
        assert_eq!(
            AnalysisError::from(ModelError::Failed("boom".into())).to_string(),
            "Analysis failed: boom"
        );
    }

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(AnalysisError::NoValidFeatures.kind(), ErrorKind::Input);
        assert_eq!(AnalysisError::from(QualityIssue::MissingImage).kind(), ErrorKind::Input);
        assert_eq!(AnalysisError::from(QualityIssue::TooDark).kind(), ErrorKind::Quality);
        assert_eq!(AnalysisError::from(ModelError::NoFaceDetected).kind(), ErrorKind::Detection);
        assert_eq!(AnalysisError::from(ModelError::NoFacesReturned).kind(), ErrorKind::Detection);
        assert_eq!(AnalysisError::from(ModelError::OutOfMemory).kind(), ErrorKind::Model);
    }
}
