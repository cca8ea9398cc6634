use crate::messages::{QueryPayload, QueryReply};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid inference url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference service answered {status}: {body}")]
    Remote {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// HTTP client for the inference service's query endpoint.
///
/// One attempt per call, no retries.
#[derive(Clone, Debug)]
pub struct InferenceClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

impl InferenceClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| ClientError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Posts `{prompt, image}` and returns the model's answer.
    pub async fn query(&self, prompt: &str, image_base64: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&QueryPayload {
                prompt: prompt.to_string(),
                image: image_base64.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Remote { status, body });
        }

        let reply = response.json::<QueryReply>().await?;
        Ok(reply.response)
    }
}
