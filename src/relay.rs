//! The local relay/UI service: serves the polling page and answers
//! `GET /get_image` by capturing a frame and forwarding it for inference.

use crate::{
    capture::{CaptureError, FrameSource},
    client::{ClientError, InferenceClient},
    codec::{self, CodecError},
    messages::{PromptParams, RelayReply},
};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
};
use std::sync::{Arc, Mutex};

const PAGE_TEMPLATE: &str = include_str!("../assets/index.html");

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("could not encode captured frame: {0}")]
    Encode(#[from] CodecError),

    #[error("capture task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Remote(#[from] ClientError),
}

/// Renders the page with the configured poll interval.
pub fn render_page(poll_interval_ms: u64) -> String {
    PAGE_TEMPLATE.replace("__POLL_INTERVAL_MS__", &poll_interval_ms.to_string())
}

pub struct RelayState {
    frames: Arc<Mutex<Box<dyn FrameSource>>>,
    client: InferenceClient,
    page: String,
}

impl RelayState {
    pub fn new(frames: Box<dyn FrameSource>, client: InferenceClient, poll_interval_ms: u64) -> Self {
        Self {
            frames: Arc::new(Mutex::new(frames)),
            client,
            page: render_page(poll_interval_ms),
        }
    }

    /// Captures one frame and returns it as base64 JPEG.
    ///
    /// The source lock is held for the whole capture, so concurrent requests
    /// take turns on the device.
    async fn capture_jpeg(&self) -> Result<String, RelayError> {
        let frames = self.frames.clone();
        let encoded = tokio::task::spawn_blocking(move || -> Result<String, RelayError> {
            let mut source = frames.lock().unwrap_or_else(|e| e.into_inner());
            let frame = source.capture()?;
            Ok(codec::encode_jpeg_base64(&frame)?)
        })
        .await??;
        Ok(encoded)
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/get_image", get(get_image))
        .with_state(Arc::new(state))
}

async fn index(State(state): State<Arc<RelayState>>) -> Html<String> {
    Html(state.page.clone())
}

async fn get_image(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<PromptParams>,
) -> (StatusCode, Json<RelayReply>) {
    log::info!("Prompt: {:?}", params.prompt);

    let image = match state.capture_jpeg().await {
        Ok(image) => image,
        Err(e) => {
            log::error!("Capture failed: {e}");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RelayReply {
                    error: Some(e.to_string()),
                    ..RelayReply::default()
                }),
            );
        }
    };

    match state.client.query(&params.prompt, &image).await {
        Ok(response) => {
            log::info!("Response: {response}");
            (
                StatusCode::OK,
                Json(RelayReply {
                    image: Some(image),
                    response: Some(response),
                    error: None,
                }),
            )
        }
        Err(e) => {
            let e = RelayError::from(e);
            log::error!("Remote query failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(RelayReply {
                    image: Some(image),
                    response: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
