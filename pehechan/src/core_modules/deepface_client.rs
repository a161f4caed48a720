// THEORY:
// `DeepFaceClient` talks to a DeepFace REST service (`deepface api`), the
// reference runtime for the detector + attribute models this system uses. The
// frame travels as a base64 JPEG data URI; the reply is either a list of
// per-face results or an error string. DeepFace only reports failures as prose,
// so error replies go through `ModelError::from_message`.

use crate::core_modules::face_selection::RawFace;
use crate::core_modules::frame::Frame;
use crate::core_modules::model::{AnalyzeRequest, FaceAnalyzer, ModelError};
use crate::core_modules::normalizer::ModelValue;
use crate::core_modules::preprocess::preprocess;
use async_trait::async_trait;
use base64::Engine;
use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;
use serde_json::Value;

const REQUEST_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Serialize)]
struct AnalyzeBody<'a> {
    img: String,
    actions: Vec<&'static str>,
    enforce_detection: bool,
    detector_backend: &'a str,
    align: bool,
}

/// HTTP adapter for a DeepFace analysis service.
#[derive(Debug, Clone)]
pub struct DeepFaceClient {
    client: reqwest::Client,
    endpoint: String,
}

impl DeepFaceClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Encodes a frame as a `data:image/jpeg;base64,...` URI.
pub fn encode_data_uri(frame: &Frame) -> Result<String, ModelError> {
    let color = match frame.channels {
        1 => image::ExtendedColorType::L8,
        3 => image::ExtendedColorType::Rgb8,
        c => {
            tracing::warn!(channels = c, "cannot encode frame for the face model");
            return Err(ModelError::InvalidImage);
        }
    };
    let rgb = preprocess(frame);

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, REQUEST_JPEG_QUALITY)
        .write_image(&rgb.data, rgb.width, rgb.height, color)
        .map_err(|e| ModelError::Failed(format!("could not encode frame: {e}")))?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(jpeg)
    ))
}

/// Interprets a DeepFace `/analyze` reply body.
pub fn parse_analyze_reply(body: Value) -> Result<Vec<RawFace>, ModelError> {
    if let Some(message) = body.get("error").or_else(|| body.get("exception")).and_then(Value::as_str) {
        return Err(ModelError::from_message(message));
    }

    // Older service versions return a single object instead of a list.
    let results = match body.get("results") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(_)) => vec![body["results"].clone()],
        _ => return Err(ModelError::Failed(format!("unexpected reply from face model: {body}"))),
    };

    results
        .into_iter()
        .map(|face| match ModelValue::from(face) {
            ModelValue::Map(map) => Ok(map),
            other => Err(ModelError::Failed(format!("face result is not an object: {other:?}"))),
        })
        .collect()
}

#[async_trait]
impl FaceAnalyzer for DeepFaceClient {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<Vec<RawFace>, ModelError> {
        let body = AnalyzeBody {
            img: encode_data_uri(&request.frame)?,
            actions: request.actions.iter().map(|f| f.as_str()).collect(),
            enforce_detection: request.enforce_detection,
            detector_backend: &request.detector_backend,
            align: request.align,
        };

        let url = format!("{}/analyze", self.endpoint);
        tracing::debug!(%url, actions = ?body.actions, "requesting face analysis");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Failed(format!("face model unreachable: {e}")))?;

        let status = response.status();
        let reply: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Failed(format!("unreadable reply from face model ({status}): {e}")))?;

        parse_analyze_reply(reply)
    }
}
