//! JSON bodies exchanged between the browser, the relay and the inference service.

use serde::{Deserialize, Serialize};

/// Body of `POST /foo`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryPayload {
    pub prompt: String,
    /// Base64-encoded image bytes.
    pub image: String,
}

/// Successful reply of `POST /foo`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryReply {
    pub response: String,
}

/// Error reply of both services.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Reply of `GET /get_image`, the same shape for success and failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RelayReply {
    /// Base64 JPEG of the captured frame, if capture succeeded.
    pub image: Option<String>,
    /// The model's answer, if the remote call succeeded.
    pub response: Option<String>,
    pub error: Option<String>,
}

/// Query string of `GET /get_image`; an absent prompt is the empty prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptParams {
    #[serde(default)]
    pub prompt: String,
}
