//! The inference service's HTTP surface.

use crate::{
    codec,
    engine::QueryEngine,
    messages::{ErrorReply, QueryPayload, QueryReply},
    model::QueryRequest,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;

/// Path of the visual query endpoint.
pub const QUERY_PATH: &str = "/foo";

/// Builds the router; `max_body_bytes` caps the JSON body of a query.
pub fn router(engine: Arc<QueryEngine>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { "Welcome to Infernum VQA!" }))
        .route("/health", get(health))
        .route(QUERY_PATH, post(post_query))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(engine)
}

async fn health(State(engine): State<Arc<QueryEngine>>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "engine": engine.state().as_str() }))
}

async fn post_query(
    State(engine): State<Arc<QueryEngine>>,
    payload: Result<Json<QueryPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            log::debug!("Rejected query body: {rejection}");
            return error_reply(rejection.status(), rejection.body_text());
        }
    };

    // decode before touching the model
    let image = match codec::decode_base64_image(&payload.image) {
        Ok(image) => image,
        Err(e) => {
            log::debug!("Rejected query image: {e}");
            return error_reply(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    match engine.query(QueryRequest::new(payload.prompt, image)).await {
        Ok(result) => {
            log::info!(
                "Query #{} answered in {:?}",
                result.id,
                result.duration
            );
            (
                StatusCode::OK,
                Json(QueryReply {
                    response: result.answer,
                }),
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Query failed: {e}");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn error_reply(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorReply { error })).into_response()
}
