//! Pipeline configuration
//!
//! Settings for page processing: the raster scale used for recognition,
//! the on-screen display scale, and how to reach the recognition service.
//! Configuration can be persisted as a versioned JSON file.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Default raster scale for recognition (2x page points)
pub const DEFAULT_RECOGNITION_SCALE: f32 = 2.0;

/// Default raster scale for on-screen display
pub const DEFAULT_DISPLAY_SCALE: f32 = 1.5;

/// Page pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Scale used to rasterize pages sent to the recognition service.
    /// Independent of `display_scale`.
    pub recognition_scale: f32,

    /// Scale used to rasterize pages for display and highlight projection
    pub display_scale: f32,

    /// Optional language hint passed through to the recognition service
    pub language: Option<String>,

    /// Recognition service endpoint URL
    pub endpoint: Option<String>,

    /// Name of the environment variable holding the service API key
    pub api_key_env: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recognition_scale: DEFAULT_RECOGNITION_SCALE,
            display_scale: DEFAULT_DISPLAY_SCALE,
            language: None,
            endpoint: None,
            api_key_env: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u32,
    pipeline: PipelineConfig,
}

impl PipelineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the recognition raster scale
    pub fn with_recognition_scale(mut self, scale: f32) -> Self {
        self.recognition_scale = scale;
        self
    }

    /// Set the display raster scale
    pub fn with_display_scale(mut self, scale: f32) -> Self {
        self.display_scale = scale;
        self
    }

    /// Set the language hint
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the recognition endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the API key environment variable name
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Check that both scales are positive and finite
    pub fn validate(&self) -> CoreResult<()> {
        for (name, value) in
            [("recognition_scale", self.recognition_scale), ("display_scale", self.display_scale)]
        {
            if !value.is_finite() || value <= 0.0 {
                return Err(CoreError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let bytes = fs::read(path)?;
        let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)?;

        if envelope.version != CONFIG_SCHEMA_VERSION {
            return Err(CoreError::Config(format!(
                "unsupported config version {} (expected {})",
                envelope.version, CONFIG_SCHEMA_VERSION
            )));
        }

        envelope.pipeline.validate()?;
        Ok(envelope.pipeline)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let envelope = ConfigEnvelope { version: CONFIG_SCHEMA_VERSION, pipeline: self.clone() };
        fs::write(path, serde_json::to_vec_pretty(&envelope)?)?;
        Ok(())
    }
}
