use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::infrastructure::graph::{oauth::OAuthTokenClient, token_cache::TokenCache};

const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Minimal Microsoft Graph client built on reqwest. Covers the two surfaces
/// this service needs: the subscriptions collection and message fetch/patch
/// for the watched mailbox.
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    tokens: Arc<TokenCache<OAuthTokenClient>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub change_type: String,
    pub notification_url: String,
    pub resource: String,
    pub expiration_date_time: String,
    pub client_state: String,
}

impl SubscriptionRequest {
    pub fn created(
        resource: &str,
        notification_url: &str,
        client_state: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            change_type: "created".to_string(),
            notification_url: notification_url.to_string(),
            resource: resource.to_string(),
            expiration_date_time: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            client_state: client_state.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResource {
    pub id: String,
    pub resource: Option<String>,
    pub expiration_date_time: DateTime<Utc>,
    pub notification_url: Option<String>,
    pub client_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionListResponse {
    #[serde(default)]
    value: Vec<SubscriptionResource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResource {
    pub subject: Option<String>,
    pub from: Option<Recipient>,
    pub body: Option<MessageBody>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: Option<EmailAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub content_type: Option<String>,
    pub content: Option<String>,
}

impl GraphClient {
    pub fn new(
        base_url: String,
        user_id: String,
        tokens: Arc<TokenCache<OAuthTokenClient>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .context("failed to build graph http client")?;

        Ok(Self {
            http,
            base_url,
            user_id,
            tokens,
        })
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        error!(
            status = %status,
            graph_request_id = ?request_id,
            response_body = %body,
            context = %context,
            "graph api request failed"
        );

        anyhow::bail!(
            "Graph API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    async fn bearer(&self) -> Result<String> {
        Ok(self.tokens.bearer_token().await?)
    }

    pub async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionResource> {
        let resp = self
            .http
            .post(format!("{}/subscriptions", self.base_url))
            .bearer_auth(self.bearer().await?)
            .json(request)
            .send()
            .await
            .context("create subscription request failed")?;

        let resp = Self::ensure_success(resp, "create subscription").await?;
        Ok(resp.json().await.context("create subscription response")?)
    }

    pub async fn renew_subscription(
        &self,
        subscription_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SubscriptionResource> {
        let body = json!({
            "expirationDateTime": expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        let resp = self
            .http
            .patch(format!("{}/subscriptions/{}", self.base_url, subscription_id))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .context("renew subscription request failed")?;

        let resp = Self::ensure_success(resp, "renew subscription").await?;
        Ok(resp.json().await.context("renew subscription response")?)
    }

    pub async fn delete_subscription(&self, subscription_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}/subscriptions/{}", self.base_url, subscription_id))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("delete subscription request failed")?;

        Self::ensure_success(resp, "delete subscription").await?;
        Ok(())
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionResource>> {
        let resp = self
            .http
            .get(format!("{}/subscriptions", self.base_url))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("list subscriptions request failed")?;

        let resp = Self::ensure_success(resp, "list subscriptions").await?;
        let list: SubscriptionListResponse =
            resp.json().await.context("list subscriptions response")?;
        Ok(list.value)
    }

    pub async fn fetch_message(&self, message_id: &str) -> Result<MessageResource> {
        let resp = self
            .http
            .get(format!(
                "{}/users/{}/messages/{}",
                self.base_url, self.user_id, message_id
            ))
            .query(&[("$select", "subject,from,body")])
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .context("fetch message request failed")?;

        let resp = Self::ensure_success(resp, "fetch message").await?;
        Ok(resp.json().await.context("fetch message response")?)
    }

    pub async fn mark_message_read(&self, message_id: &str) -> Result<()> {
        let body = json!({ "isRead": true });

        let resp = self
            .http
            .patch(format!(
                "{}/users/{}/messages/{}",
                self.base_url, self.user_id, message_id
            ))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await
            .context("mark message read request failed")?;

        Self::ensure_success(resp, "mark message read").await?;
        Ok(())
    }
}
