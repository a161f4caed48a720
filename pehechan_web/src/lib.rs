//! Serving layer for Pehechan: the shared camera session, the MJPEG live feed,
//! configuration loading and the axum router in front of the analysis pipeline.

pub mod camera;
pub mod config;
pub mod mjpeg;
#[cfg(feature = "opencv")]
pub mod opencv_camera;
pub mod page;
pub mod server;

pub use camera::{CameraBackend, CameraDevice, CameraError, CameraSession, CameraSettings, Lifecycle};
pub use config::AppConfig;
pub use server::{AppState, router, serve};
