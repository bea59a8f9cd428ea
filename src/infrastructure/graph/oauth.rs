use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::error;

use crate::infrastructure::graph::token_cache::{ExchangedToken, TokenExchanger};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Client-credentials exchanger against the Microsoft identity platform.
pub struct OAuthTokenClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl OAuthTokenClient {
    pub fn new(tenant_id: &str, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                tenant_id
            ),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenExchanger for OAuthTokenClient {
    async fn exchange(&self) -> Result<ExchangedToken> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .context("token endpoint unreachable")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, response_body = %body, "oauth: token exchange rejected");
            anyhow::bail!("token exchange rejected with status {}", status);
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("token response body was not valid JSON")?;

        Ok(ExchangedToken {
            access_token: token.access_token,
            expires_in_seconds: token.expires_in,
        })
    }
}
