use anyhow::Context;
use pehechan::{AnalysisPipeline, DeepFaceClient};
use pehechan_web::opencv_camera::OpenCvBackend;
use pehechan_web::{AppConfig, AppState, CameraSession};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        bind_addr = %config.server.bind_addr,
        model = %config.model.endpoint,
        camera = config.camera.index,
        "starting Pehechan AI"
    );

    let analyzer = DeepFaceClient::new(config.model.endpoint.as_str());
    let pipeline = Arc::new(AnalysisPipeline::new(config.pipeline_config(), Arc::new(analyzer)));
    let session = Arc::new(CameraSession::new(Arc::new(OpenCvBackend), config.camera.clone()));

    let state = AppState {
        session: Arc::clone(&session),
        pipeline,
    };

    // Releasing the camera ends any open feed, which lets graceful shutdown finish.
    let shutdown_session = Arc::clone(&session);
    let shutdown = async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for shutdown signal");
        }
        tracing::info!("shutting down");
        if !shutdown_session.shutdown().await {
            tracing::debug!("no camera open at shutdown");
        }
    };

    pehechan_web::serve(state, &config.server, shutdown)
        .await
        .with_context(|| format!("server on {} failed", config.server.bind_addr))?;

    session.cleanup();
    Ok(())
}
