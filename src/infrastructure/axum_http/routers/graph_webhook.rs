use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::infrastructure::background::ingestion_queue::IngestionQueue;

pub fn routes(queue: Arc<IngestionQueue>) -> Router {
    Router::new()
        .route("/notifications", post(handle_notification))
        .with_state(queue)
}

#[derive(Debug, Deserialize)]
pub struct ValidationQuery {
    #[serde(rename = "validationToken")]
    validation_token: Option<String>,
}

/// Webhook endpoint. Two modes: the provider's validation handshake, which
/// echoes the token back verbatim, and a notification delivery, which is
/// acknowledged with 202 immediately while the payload is processed by the
/// worker pool.
pub async fn handle_notification(
    State(queue): State<Arc<IngestionQueue>>,
    Query(query): Query<ValidationQuery>,
    body: String,
) -> Response {
    if let Some(token) = query.validation_token {
        info!("webhook: validation handshake received, echoing token");
        return (StatusCode::OK, token).into_response();
    }

    debug!(body_length = body.len(), "webhook: notification delivery received");
    queue.enqueue(body);

    StatusCode::ACCEPTED.into_response()
}
