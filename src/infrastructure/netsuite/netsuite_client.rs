use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::entities::payment_notifications::PaymentNotificationEntity;

type HmacSha256 = Hmac<Sha256>;

/// NetSuite REST client: looks up the invoice a payment concept refers to
/// and transforms it into a customer payment. Requests are signed with
/// OAuth 1.0a (HMAC-SHA256), NetSuite's token-based authentication.
pub struct NetSuiteClient {
    http: reqwest::Client,
    account_id: String,
    consumer_key: String,
    consumer_secret: String,
    token_id: String,
    token_secret: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SuiteQlResponse {
    #[serde(default)]
    items: Vec<SuiteQlRow>,
}

#[derive(Debug, Deserialize)]
struct SuiteQlRow {
    id: Option<String>,
}

impl NetSuiteClient {
    pub fn new(
        account_id: String,
        consumer_key: String,
        consumer_secret: String,
        token_id: String,
        token_secret: String,
        base_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_id,
            consumer_key,
            consumer_secret,
            token_id,
            token_secret,
            base_url,
        }
    }

    /// Applies a recorded payment to the invoice its concept names. The
    /// concept carries the invoice number (tranid); no match is a failure so
    /// the record ends up APPLY_FAILED rather than silently dropped.
    pub async fn apply_payment(&self, payment: &PaymentNotificationEntity) -> Result<()> {
        info!(
            tracking_key = %payment.tracking_key,
            payment_concept = ?payment.payment_concept,
            amount = ?payment.amount,
            "netsuite: applying payment"
        );

        let concept = payment
            .payment_concept
            .as_deref()
            .filter(|c| !c.is_empty())
            .context("payment has no concept to match an invoice against")?;

        let invoice_id = self
            .find_invoice_by_reference(concept)
            .await?
            .with_context(|| format!("no open invoice found for reference {concept}"))?;

        self.apply_payment_to_invoice(&invoice_id, payment).await
    }

    /// SuiteQL lookup of an open customer invoice by transaction id.
    async fn find_invoice_by_reference(&self, reference: &str) -> Result<Option<String>> {
        let endpoint = format!(
            "https://{}.{}/services/rest/query/v1/suiteql",
            self.account_id.replace('_', "-"),
            self.base_url
        );

        let query = format!(
            "SELECT id FROM transaction WHERE tranid = '{}' AND type = 'CustInvc' AND status != 'CustInvc:V'",
            reference.replace('\'', "''")
        );

        let resp = self
            .http
            .post(&endpoint)
            .header("Authorization", self.oauth1_header("POST", &endpoint))
            .header("Prefer", "transient")
            .json(&json!({ "q": query }))
            .send()
            .await
            .context("suiteql request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, response_body = %body, "netsuite: invoice lookup failed");
            anyhow::bail!("invoice lookup failed with status {}", status);
        }

        let result: SuiteQlResponse = resp.json().await.context("suiteql response")?;
        Ok(result.items.into_iter().find_map(|row| row.id))
    }

    async fn apply_payment_to_invoice(
        &self,
        invoice_id: &str,
        payment: &PaymentNotificationEntity,
    ) -> Result<()> {
        let endpoint = format!(
            "https://{}.{}/services/rest/record/v1/invoice/{}/!transform/customerPayment",
            self.account_id.replace('_', "-"),
            self.base_url,
            invoice_id
        );

        let trandate = payment
            .applied_at
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d")
            .to_string();
        let tracking_key = payment.tracking_key.as_str();
        let reference = payment.reference.as_deref().unwrap_or_default();
        let source_account = payment.source_account.as_deref().unwrap_or_default();

        let body = json!({
            "payment": payment.amount.as_deref().unwrap_or("0"),
            "trandate": trandate,
            "memo": format!(
                "Pago SPEI - Clave: {tracking_key} - Ref: {reference} - Origen: {source_account}"
            ),
            "custbody_clave_rastreo": tracking_key,
            "custbody_referencia_banco": reference,
            "custbody_cuenta_origen": source_account,
            "custbody_institucion_emisora": payment.issuing_institution.as_deref().unwrap_or_default(),
        });

        let resp = self
            .http
            .post(&endpoint)
            .header("Authorization", self.oauth1_header("POST", &endpoint))
            .json(&body)
            .send()
            .await
            .context("payment transform request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(
                %status,
                invoice_id,
                tracking_key = %payment.tracking_key,
                response_body = %body,
                "netsuite: payment transform failed"
            );
            anyhow::bail!("payment transform failed with status {}", status);
        }

        info!(
            invoice_id,
            tracking_key = %payment.tracking_key,
            "netsuite: payment applied to invoice"
        );
        Ok(())
    }

    fn oauth1_header(&self, http_method: &str, url: &str) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = Utc::now().timestamp().to_string();
        self.oauth1_header_with(http_method, url, &nonce, &timestamp)
    }

    fn oauth1_header_with(
        &self,
        http_method: &str,
        url: &str,
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut params = BTreeMap::new();
        params.insert("oauth_consumer_key", self.consumer_key.as_str());
        params.insert("oauth_token", self.token_id.as_str());
        params.insert("oauth_nonce", nonce);
        params.insert("oauth_timestamp", timestamp);
        params.insert("oauth_signature_method", "HMAC-SHA256");
        params.insert("oauth_version", "1.0");

        let parameter_string = params
            .iter()
            .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            http_method.to_uppercase(),
            percent_encode(url),
            percent_encode(&parameter_string)
        );

        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(&self.token_secret)
        );

        let signature = sign_hmac_sha256(&signing_key, &base_string);

        let header_params = params
            .iter()
            .map(|(key, value)| {
                format!("{}=\"{}\"", percent_encode(key), percent_encode(value))
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "OAuth realm=\"{}\", {}, oauth_signature=\"{}\"",
            self.account_id.replace('-', "_"),
            header_params,
            percent_encode(&signature)
        )
    }
}

fn sign_hmac_sha256(key: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("hmac accepts keys of any length");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// RFC 3986 percent encoding: unreserved characters pass through, everything
/// else becomes %XX.
fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{:02X}", byte));
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> NetSuiteClient {
        NetSuiteClient::new(
            "123456_SB1".to_string(),
            "consumer-key".to_string(),
            "consumer-secret".to_string(),
            "token-id".to_string(),
            "token-secret".to_string(),
            "suitetalk.api.netsuite.com".to_string(),
        )
    }

    #[test]
    fn percent_encoding_follows_rfc_3986() {
        assert_eq!(percent_encode("abc-XYZ_0.9~"), "abc-XYZ_0.9~");
        assert_eq!(percent_encode("a b"), "a%20b");
        assert_eq!(percent_encode("a+b*c"), "a%2Bb%2Ac");
        assert_eq!(
            percent_encode("https://example.com/x?y=z"),
            "https%3A%2F%2Fexample.com%2Fx%3Fy%3Dz"
        );
    }

    #[test]
    fn signature_is_deterministic_for_fixed_inputs() {
        let client = client();
        let url = "https://123456-sb1.suitetalk.api.netsuite.com/services/rest/query/v1/suiteql";

        let first = client.oauth1_header_with("POST", url, "nonce123", "1700000000");
        let second = client.oauth1_header_with("POST", url, "nonce123", "1700000000");
        assert_eq!(first, second);

        // A different nonce must change the signature.
        let third = client.oauth1_header_with("POST", url, "nonce456", "1700000000");
        assert_ne!(first, third);
    }

    #[test]
    fn header_carries_all_oauth_parameters_and_realm() {
        let client = client();
        let header = client.oauth1_header_with(
            "POST",
            "https://123456-sb1.suitetalk.api.netsuite.com/services/rest/query/v1/suiteql",
            "nonce123",
            "1700000000",
        );

        assert!(header.starts_with("OAuth realm=\"123456_SB1\""));
        assert!(header.contains("oauth_consumer_key=\"consumer-key\""));
        assert!(header.contains("oauth_token=\"token-id\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA256\""));
        assert!(header.contains("oauth_version=\"1.0\""));
        assert!(header.contains("oauth_nonce=\"nonce123\""));
        assert!(header.contains("oauth_timestamp=\"1700000000\""));
        assert!(header.contains("oauth_signature=\""));
    }
}
