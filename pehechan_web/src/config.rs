use crate::camera::CameraSettings;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use pehechan::core_modules::model::DEFAULT_DETECTOR_BACKEND;
use pehechan::{PipelineConfig, QualityConfig};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "pehechan";
pub const ENV_PREFIX: &str = "PEHECHAN";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Where the face model lives.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the DeepFace REST service.
    pub endpoint: String,
    pub detector_backend: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5005".to_string(),
            detector_backend: DEFAULT_DETECTOR_BACKEND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub camera: CameraSettings,
    pub model: ModelConfig,
    pub quality: QualityConfig,
}

impl AppConfig {
    /// Defaults, then `pehechan.{toml,yaml,json,...}` if present, then
    /// `PEHECHAN__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true)),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            quality: self.quality.clone(),
            detector_backend: self.model.detector_backend.clone(),
        }
    }
}
