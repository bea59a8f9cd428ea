use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read-only projection of the subscription lifecycle state, served by the
/// admin status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookStatusDto {
    pub active: bool,
    pub subscription_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub resource: String,
    pub notification_url: String,
    pub client_state: String,
    pub message: String,
}

/// Admin projection of the credential cache.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatusDto {
    pub has_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub expiring_soon: bool,
    pub minutes_until_expiry: i64,
}
