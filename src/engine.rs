use crate::model::{QueryMetadata, QueryRequest, VisualQueryModel};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

/// Represents the current state of the query engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QueryEngineState {
    /// The worker is waiting for a request.
    Idle,
    /// The worker is running the model.
    Processing,
}

impl QueryEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryEngineState::Idle => "idle",
            QueryEngineState::Processing => "processing",
        }
    }
}

/// Errors surfaced to callers of [`QueryEngine::query`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The model failed on this request. The worker keeps serving.
    #[error("model inference failed: {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The worker thread is gone, either stopped or panicked.
    #[error("query engine is not running")]
    Stopped,
}

/// Per-engine behavior switches.
#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    /// Compute and log a short caption before answering each query.
    pub caption: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { caption: true }
    }
}

/// Response returned by the engine containing both the answer and telemetry data.
#[derive(Debug)]
pub struct QueryEngineResponse {
    /// Identifier assigned when the request was submitted.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time spent in the model, caption included.
    pub duration: Duration,
    /// Metadata extracted from the original request.
    pub request_metadata: QueryMetadata,
    /// The diagnostic caption, when captioning is enabled.
    pub caption: Option<String>,
    /// The model's answer to the prompt.
    pub answer: String,
}

struct QueryEngineRequest {
    id: u64,
    request: QueryRequest,
    reply: oneshot::Sender<Result<QueryEngineResponse, EngineError>>,
}

/// Runs a [`VisualQueryModel`] on a dedicated thread.
///
/// The model is loaded once by the caller and moved into the worker; every
/// query is sent over a channel and answered through a one-shot reply, so
/// concurrent callers are served one at a time in submission order.
pub struct QueryEngine {
    state: Arc<Mutex<QueryEngineState>>,
    req_tx: Option<mpsc::Sender<QueryEngineRequest>>,
    worker_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl QueryEngine {
    /// Creates a new engine and spawns the worker that owns `model`.
    pub fn new<M>(mut model: M, options: EngineOptions) -> Self
    where
        M: VisualQueryModel + Send + 'static,
    {
        let (req_tx, req_rx) = mpsc::channel::<QueryEngineRequest>();
        let state = Arc::new(Mutex::new(QueryEngineState::Idle));

        let worker_handle = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Scheduling query #{}", req.id);

                    set_state(&state, QueryEngineState::Processing);
                    let start_time = Instant::now();
                    let request_metadata = req.request.metadata();

                    let result = run_query(&mut model, req.request, options)
                        .map(|(caption, answer)| QueryEngineResponse {
                            id: req.id,
                            start_time,
                            duration: start_time.elapsed(),
                            request_metadata,
                            caption,
                            answer,
                        })
                        .map_err(|e| EngineError::Model(Box::new(e)));

                    set_state(&state, QueryEngineState::Idle);

                    if let Err(e) = &result {
                        log::error!("Query #{} failed: {e}", req.id);
                    }
                    // the caller may have gone away; nothing to do then
                    let _ = req.reply.send(result);
                }
                log::debug!("Query engine worker exiting");
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            worker_handle: Some(worker_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the engine.
    pub fn state(&self) -> QueryEngineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submits a query and waits for the worker to answer it.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryEngineResponse, EngineError> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(QueryEngineRequest {
            id,
            request,
            reply: reply_tx,
        })
        .map_err(|_| EngineError::Stopped)?;

        reply_rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Stops the engine and waits for the worker to finish pending queries.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                log::error!("Query engine worker panicked");
            }
        }
    }
}

impl Drop for QueryEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<QueryEngineState>, value: QueryEngineState) {
    *state.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

fn run_query<M: VisualQueryModel>(
    model: &mut M,
    request: QueryRequest,
    options: EngineOptions,
) -> Result<(Option<String>, String), M::Error> {
    let size = request.image.size();
    log::info!(
        "Processing prompt {:?} for {}x{} image",
        request.prompt,
        size.width,
        size.height
    );

    // the caption never leaves the worker, it only feeds the log
    let caption = if options.caption {
        let caption = model.caption(&request.image)?;
        log::info!("Short caption: {caption}");
        Some(caption)
    } else {
        None
    };

    log::info!("Visual query: {}", request.prompt);
    let answer = model.query(&request.image, &request.prompt)?;
    log::info!("Answer: {answer}");

    Ok((caption, answer))
}
