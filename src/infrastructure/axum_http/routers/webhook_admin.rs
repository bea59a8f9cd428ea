use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde_json::json;
use tracing::info;

use crate::{
    application::usecases::subscription_lifecycle::{
        CREATION_MARGIN_HOURS, PROVIDER_MAX_LIFETIME_HOURS, RENEWAL_THRESHOLD_HOURS,
        SubscriptionLifecycle,
    },
    infrastructure::graph::{
        graph_client::GraphClient, oauth::OAuthTokenClient, token_cache::TokenCache,
    },
};

#[derive(Clone)]
pub struct AdminState {
    pub lifecycle: Arc<SubscriptionLifecycle<GraphClient>>,
    pub tokens: Arc<TokenCache<OAuthTokenClient>>,
}

pub fn routes(state: AdminState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/recreate", post(recreate))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/:subscription_id", delete(delete_subscription))
        .route("/config", get(config))
        .route("/token", get(token_status))
        .with_state(state)
}

pub async fn status(State(state): State<AdminState>) -> impl IntoResponse {
    Json(state.lifecycle.status())
}

pub async fn recreate(State(state): State<AdminState>) -> Response {
    info!("admin: manual subscription recreate requested");
    match state.lifecycle.recreate().await {
        Ok(()) => Json(state.lifecycle.status()).into_response(),
        Err(err) => (err.status_code(), err.to_string()).into_response(),
    }
}

pub async fn list_subscriptions(State(state): State<AdminState>) -> Response {
    match state.lifecycle.list_remote().await {
        Ok(subscriptions) => Json(subscriptions).into_response(),
        Err(err) => (err.status_code(), err.to_string()).into_response(),
    }
}

pub async fn delete_subscription(
    State(state): State<AdminState>,
    Path(subscription_id): Path<String>,
) -> Response {
    info!(%subscription_id, "admin: manual subscription deletion requested");
    match state.lifecycle.delete_remote(&subscription_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (err.status_code(), err.to_string()).into_response(),
    }
}

pub async fn config(State(state): State<AdminState>) -> impl IntoResponse {
    let settings = state.lifecycle.settings();
    Json(json!({
        "resource": settings.resource,
        "notificationUrl": settings.notification_url,
        "maxLifetimeHours": PROVIDER_MAX_LIFETIME_HOURS - CREATION_MARGIN_HOURS,
        "renewalThresholdHours": RENEWAL_THRESHOLD_HOURS,
    }))
}

pub async fn token_status(State(state): State<AdminState>) -> impl IntoResponse {
    Json(state.tokens.token_status())
}
