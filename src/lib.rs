//! Visual question answering over HTTP.
//!
//! The inference side wraps a [`VisualQueryModel`] in a [`QueryEngine`] and
//! exposes it through [`server::router`]; the relay side captures frames from
//! a [`capture::FrameSource`], forwards them with an [`InferenceClient`] and
//! serves a polling page through [`relay::router`].

pub mod capture;
pub mod client;
pub mod codec;
pub mod config;
pub mod engine;
pub mod messages;
pub mod model;
#[cfg(feature = "paligemma")]
pub mod paligemma;
pub mod provision;
pub mod relay;
pub mod server;

pub use client::InferenceClient;
pub use engine::{EngineError, EngineOptions, QueryEngine, QueryEngineResponse, QueryEngineState};
pub use model::{Frame, QueryMetadata, QueryRequest, VisualQueryModel};

/// Installs the `env_logger` backend, defaulting to `info` unless `RUST_LOG` is set.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
