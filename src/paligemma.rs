//! [`VisualQueryModel`] backed by kornia-vlm's Paligemma.

use crate::{
    config::{ConfigError, ModelConfig},
    model::{Frame, VisualQueryModel},
};
use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};

/// Paligemma task prefix for a short English caption.
const CAPTION_PROMPT: &str = "caption en";

/// Repository and revision the kornia-vlm Paligemma loader reads.
pub const MODEL_ID: &str = crate::config::DEFAULT_MODEL_ID;
pub const MODEL_REVISION: &str = "main";

/// Rejects a `[model]` section naming weights this backend would not load.
///
/// Provisioning and the startup weight check follow `model_id`/`revision`, so
/// they must agree with what [`PaligemmaModel::load`] actually reads.
pub fn check_model_identity(config: &ModelConfig) -> Result<(), ConfigError> {
    if config.model_id != MODEL_ID || config.revision != MODEL_REVISION {
        return Err(ConfigError::Invalid(format!(
            "the paligemma backend loads {MODEL_ID}@{MODEL_REVISION}, not {}@{}",
            config.model_id, config.revision
        )));
    }
    Ok(())
}

pub struct PaligemmaModel {
    inner: Paligemma,
    sample_len: usize,
    caption_len: usize,
}

impl PaligemmaModel {
    /// Loads the weights from the local Hugging Face cache onto the compiled
    /// device. Call [`crate::provision::ensure_weights`] first.
    pub fn load(config: &ModelConfig) -> Result<Self, PaligemmaError> {
        log::info!("Loading {} ({})", config.model_id, config.revision);
        let inner = Paligemma::new(PaligemmaConfig::default())?;
        Ok(Self {
            inner,
            sample_len: config.sample_len,
            caption_len: config.caption_len,
        })
    }
}

impl VisualQueryModel for PaligemmaModel {
    type Error = PaligemmaError;

    fn caption(&mut self, image: &Frame) -> Result<String, Self::Error> {
        self.inner
            .inference(image, CAPTION_PROMPT, self.caption_len, false)
    }

    fn query(&mut self, image: &Frame, prompt: &str) -> Result<String, Self::Error> {
        self.inner.inference(image, prompt, self.sample_len, false)
    }
}
