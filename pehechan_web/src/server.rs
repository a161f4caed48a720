// THEORY:
// The `server` module is the HTTP face of the system. It is deliberately thin:
// every route either hands work to the `CameraSession` (on the blocking pool,
// since device calls block) or to the `AnalysisPipeline`, and turns the result
// into the `{success, ...}` JSON the page expects. No handler returns an HTTP
// error status for a domain failure; the page reads `success` and `error`.

use crate::camera::CameraSession;
use crate::config::ServerConfig;
use crate::{mjpeg, page};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use pehechan::AnalysisPipeline;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub const HEALTH_MESSAGE: &str = "Pehechan AI - Advanced Facial Analysis System";

/// Everything a handler needs, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<CameraSession>,
    pub pipeline: Arc<AnalysisPipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/camera_feed", get(camera_feed))
        .route("/initialize_camera", post(initialize_camera))
        .route("/capture_and_analyze", post(capture_and_analyze))
        .route("/cleanup_camera", post(cleanup_camera))
        .route("/health", get(health))
        .with_state(state)
}

/// Binds `config.bind_addr` and serves until `shutdown` resolves. Open feed
/// connections only close once the camera session stops streaming, so the
/// shutdown future should clean the session up before it completes.
pub async fn serve<F>(state: AppState, config: &ServerConfig, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Pehechan AI listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}

fn failure(error: impl fmt::Display) -> axum::Json<Value> {
    axum::Json(json!({ "success": false, "error": error.to_string() }))
}

async fn index() -> Html<&'static str> {
    Html(page::INDEX_HTML)
}

async fn health() -> axum::Json<Value> {
    axum::Json(json!({ "status": "healthy", "message": HEALTH_MESSAGE }))
}

async fn camera_feed(State(state): State<AppState>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(state.session.stream()),
    )
}

async fn initialize_camera(State(state): State<AppState>) -> axum::Json<Value> {
    let session = Arc::clone(&state.session);
    match tokio::task::spawn_blocking(move || session.initialize()).await {
        Ok(Ok(())) => axum::Json(json!({ "success": true, "message": "Camera initialized" })),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "camera initialization failed");
            failure(err)
        }
        Err(err) => {
            tracing::error!(error = %err, "camera initialization task failed");
            failure(err)
        }
    }
}

async fn cleanup_camera(State(state): State<AppState>) -> axum::Json<Value> {
    let session = Arc::clone(&state.session);
    match tokio::task::spawn_blocking(move || session.cleanup()).await {
        Ok(_) => axum::Json(json!({ "success": true, "message": "Camera cleaned up" })),
        Err(err) => failure(err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CaptureRequest {
    #[serde(default)]
    features: Option<Vec<String>>,
}

async fn capture_and_analyze(State(state): State<AppState>, body: Bytes) -> axum::Json<Value> {
    let request = if body.is_empty() {
        CaptureRequest::default()
    } else {
        match serde_json::from_slice::<CaptureRequest>(&body) {
            Ok(request) => request,
            Err(err) => return failure(format!("Analysis failed: {err}")),
        }
    };

    let features = request.features.unwrap_or_default();
    if features.is_empty() {
        return failure("Please select at least one feature to analyze");
    }

    let session = Arc::clone(&state.session);
    let frame = match tokio::task::spawn_blocking(move || session.capture_frame()).await {
        Ok(Ok(frame)) => frame,
        Ok(Err(err)) => return failure(err),
        Err(err) => return failure(format!("Analysis failed: {err}")),
    };

    match state.pipeline.analyze(frame, &features).await {
        Ok(report) => axum::Json(json!({
            "success": true,
            "results": report.data,
            "metadata": report.metadata,
        })),
        Err(err) => failure(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraSettings;
    use crate::camera::tests::FakeBackend;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use futures_util::StreamExt;
    use pehechan::core_modules::face_selection::RawFace;
    use pehechan::{AnalyzeRequest, FaceAnalyzer, ModelError, ModelValue, PipelineConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct FixedAnalyzer {
        reply: Result<Vec<RawFace>, ModelError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FaceAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _request: AnalyzeRequest) -> Result<Vec<RawFace>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn face() -> RawFace {
        match ModelValue::from(json!({
            "age": 34,
            "region": {"x": 12, "y": 8, "w": 140, "h": 150},
            "gender": {"Woman": 4.5, "Man": 95.5},
            "dominant_gender": "Man",
            "emotion": {"happy": 70.0, "neutral": 30.0},
            "dominant_emotion": "happy",
            "race": {"asian": 80.25, "white": 19.75},
            "dominant_race": "asian"
        })) {
            ModelValue::Map(map) => map,
            _ => unreachable!(),
        }
    }

    fn state_with(backend: FakeBackend, reply: Result<Vec<RawFace>, ModelError>) -> (AppState, Arc<FixedAnalyzer>) {
        let analyzer = Arc::new(FixedAnalyzer {
            reply,
            calls: AtomicUsize::new(0),
        });
        let state = AppState {
            session: Arc::new(CameraSession::new(Arc::new(backend), CameraSettings::default())),
            pipeline: Arc::new(AnalysisPipeline::new(PipelineConfig::default(), analyzer.clone())),
        };
        (state, analyzer)
    }

    async fn post_json(state: &AppState, uri: &str, body: &str) -> Value {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let (state, _) = state_with(FakeBackend::default(), Ok(vec![]));
        let response = router(state).oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"status": "healthy", "message": HEALTH_MESSAGE}));
    }

    #[tokio::test]
    async fn index_serves_the_page() {
        let (state, _) = state_with(FakeBackend::default(), Ok(vec![]));
        let response = router(state).oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
    }

    #[tokio::test]
    async fn initialize_reports_open_failures() {
        let (state, _) = state_with(
            FakeBackend {
                fail_open: true,
                ..FakeBackend::default()
            },
            Ok(vec![]),
        );
        let body = post_json(&state, "/initialize_camera", "").await;
        assert_eq!(body, json!({"success": false, "error": "Could not open camera"}));
    }

    #[tokio::test]
    async fn capture_without_camera_is_rejected() {
        let (state, analyzer) = state_with(FakeBackend::default(), Ok(vec![face()]));
        let body = post_json(&state, "/capture_and_analyze", r#"{"features": ["age"]}"#).await;
        assert_eq!(body, json!({"success": false, "error": "Camera not initialized"}));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn capture_needs_at_least_one_feature() {
        let (state, _) = state_with(FakeBackend::default(), Ok(vec![face()]));
        for body in [r#"{"features": []}"#, "{}", ""] {
            let reply = post_json(&state, "/capture_and_analyze", body).await;
            assert_eq!(reply["error"], json!("Please select at least one feature to analyze"));
        }
    }

    #[tokio::test]
    async fn malformed_body_is_an_analysis_failure() {
        let (state, _) = state_with(FakeBackend::default(), Ok(vec![face()]));
        let reply = post_json(&state, "/capture_and_analyze", "{not json").await;
        assert_eq!(reply["success"], json!(false));
        assert!(reply["error"].as_str().unwrap().starts_with("Analysis failed: "));
    }

    #[tokio::test]
    async fn full_capture_and_analyze_round() {
        let (state, analyzer) = state_with(FakeBackend::default(), Ok(vec![face()]));
        assert_eq!(
            post_json(&state, "/initialize_camera", "").await,
            json!({"success": true, "message": "Camera initialized"})
        );

        let reply = post_json(&state, "/capture_and_analyze", r#"{"features": ["age", "race"]}"#).await;
        assert_eq!(reply["success"], json!(true));
        assert_eq!(reply["results"]["age"]["display"], json!("34 years old (Adult)"));
        assert_eq!(reply["results"]["race"]["display"], json!("Asian"));
        assert!(reply["results"].get("gender").is_none());
        assert_eq!(reply["metadata"]["face_region"]["w"], json!(140));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            post_json(&state, "/cleanup_camera", "").await,
            json!({"success": true, "message": "Camera cleaned up"})
        );
        let reply = post_json(&state, "/capture_and_analyze", r#"{"features": ["age"]}"#).await;
        assert_eq!(reply["error"], json!("Camera not initialized"));
    }

    #[tokio::test]
    async fn model_failures_are_reported_as_errors() {
        let (state, _) = state_with(FakeBackend::default(), Err(ModelError::NoFaceDetected));
        post_json(&state, "/initialize_camera", "").await;
        let reply = post_json(&state, "/capture_and_analyze", r#"{"features": ["emotion"]}"#).await;
        assert_eq!(reply["success"], json!(false));
        assert_eq!(reply["error"], json!(ModelError::NoFaceDetected.to_string()));
    }

    #[tokio::test]
    async fn feed_streams_multipart_jpeg_until_cleanup() {
        let (state, _) = state_with(FakeBackend::default(), Ok(vec![]));
        post_json(&state, "/initialize_camera", "").await;

        let response = router(state.clone())
            .oneshot(Request::get("/camera_feed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], mjpeg::CONTENT_TYPE);

        let mut body = response.into_body().into_data_stream();
        let part = body.next().await.unwrap().unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));

        post_json(&state, "/cleanup_camera", "").await;
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn feed_is_empty_without_camera() {
        let (state, _) = state_with(FakeBackend::default(), Ok(vec![]));
        let response = router(state)
            .oneshot(Request::get("/camera_feed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
}
