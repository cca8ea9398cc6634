//! Startup configuration.
//!
//! Each binary reads an optional TOML file passed with `--config`; every field
//! has a default so an empty (or absent) file is a valid configuration.

use serde::{Deserialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Loads `T` from a TOML file, or returns the defaults when `path` is `None`.
pub fn load<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, ConfigError> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&text)?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Where the model runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// Whatever the crate was built for.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl Accelerator {
    /// Resolves `Auto` and checks the request against the compiled backends.
    pub fn resolve(self) -> Result<Accelerator, ConfigError> {
        let compiled = if cfg!(feature = "cuda") {
            Accelerator::Cuda
        } else {
            Accelerator::Cpu
        };
        match self {
            Accelerator::Auto => Ok(compiled),
            requested if requested == compiled => Ok(requested),
            Accelerator::Cuda => Err(ConfigError::Invalid(
                "accelerator = \"cuda\" needs a build with the `cuda` feature".to_string(),
            )),
            Accelerator::Cpu => Err(ConfigError::Invalid(
                "accelerator = \"cpu\" needs a build without the `cuda` feature".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Accelerator::Auto => "auto",
            Accelerator::Cpu => "cpu",
            Accelerator::Cuda => "cuda",
        }
    }
}

/// Repository of the default (Paligemma) backend.
pub const DEFAULT_MODEL_ID: &str = "google/paligemma-3b-mix-224";

/// Model identity, placement and inference settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hugging Face repository holding the weights.
    pub model_id: String,
    pub revision: String,
    pub accelerator: Accelerator,
    /// Fetch missing weights at startup instead of failing.
    pub allow_download: bool,
    /// Compute and log a short caption before each query.
    pub caption: bool,
    /// Maximum tokens generated for an answer.
    pub sample_len: usize,
    /// Maximum tokens generated for the caption.
    pub caption_len: usize,
    /// Files that must be cached before the model may load.
    pub required_files: Vec<String>,
    /// Upper bound on a provisioning run.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            accelerator: Accelerator::Auto,
            allow_download: false,
            caption: true,
            sample_len: 50,
            caption_len: 20,
            required_files: vec![
                "tokenizer.json".to_string(),
                "model.safetensors.index.json".to_string(),
            ],
            timeout_secs: 3600,
        }
    }
}

/// Inference service settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted query body; base64 inflates images by a third.
    pub max_body_bytes: usize,
    pub model: ModelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_bytes: 64 * 1024 * 1024,
            model: ModelConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Relay/UI service settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Full URL of the inference service's query endpoint.
    pub inference_url: String,
    pub request_timeout_secs: u64,
    pub camera_index: u32,
    /// Serve this file instead of a camera frame.
    pub still_image: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            inference_url: "http://127.0.0.1:3000/foo".to_string(),
            request_timeout_secs: 120,
            camera_index: 0,
            still_image: None,
            poll_interval_ms: 5000,
        }
    }
}

impl RelayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        reqwest::Url::parse(&self.inference_url)
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid(format!("inference_url: {e}")))
    }
}
