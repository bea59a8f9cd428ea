use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{error, info};

use crate::domain::value_objects::webhook_status::TokenStatusDto;

/// How close to expiry a token may get before callers refresh it.
const REFRESH_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token exchange failed: {0}")]
    ExchangeFailed(#[source] anyhow::Error),
}

/// Bearer credential returned by the identity provider. Value and expiry are
/// only ever swapped together.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_expiring_soon(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now + Duration::minutes(REFRESH_BUFFER_MINUTES)
    }
}

/// Raw result of a client-credentials exchange.
#[derive(Debug, Clone)]
pub struct ExchangedToken {
    pub access_token: String,
    pub expires_in_seconds: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<ExchangedToken>;
}

/// Caches one bearer token and refreshes it through the exchanger when it is
/// absent or about to lapse. Concurrent callers hitting the expiry window are
/// collapsed into a single in-flight exchange.
pub struct TokenCache<E>
where
    E: TokenExchanger + 'static,
{
    exchanger: Arc<E>,
    current: RwLock<Option<AccessToken>>,
    // Serializes refreshes; readers on the fast path never touch it.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl<E> TokenCache<E>
where
    E: TokenExchanger + 'static,
{
    pub fn new(exchanger: Arc<E>) -> Self {
        Self {
            exchanger,
            current: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns a token that is valid for at least the refresh buffer,
    /// refreshing it first when needed.
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_fresh_token() {
            return Ok(token.value);
        }

        let _gate = self.refresh_gate.lock().await;

        // A concurrent caller may have refreshed while we waited on the gate.
        if let Some(token) = self.cached_fresh_token() {
            return Ok(token.value);
        }

        info!("token cache: token absent or expiring soon, refreshing");
        let token = self.exchange_and_store().await?;
        Ok(token.value)
    }

    /// Unconditional refresh, used by the proactive background tick so that
    /// foreground callers rarely see the synchronous exchange path.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;
        self.exchange_and_store().await?;
        Ok(())
    }

    pub fn token_status(&self) -> TokenStatusDto {
        let now = Utc::now();
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());

        match current.as_ref() {
            Some(token) => TokenStatusDto {
                has_token: true,
                expires_at: Some(token.expires_at),
                expiring_soon: token.is_expiring_soon(now),
                minutes_until_expiry: (token.expires_at - now).num_minutes(),
            },
            None => TokenStatusDto {
                has_token: false,
                expires_at: None,
                expiring_soon: true,
                minutes_until_expiry: 0,
            },
        }
    }

    fn cached_fresh_token(&self) -> Option<AccessToken> {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        current
            .as_ref()
            .filter(|token| !token.is_expiring_soon(Utc::now()))
            .cloned()
    }

    async fn exchange_and_store(&self) -> Result<AccessToken, AuthError> {
        let exchanged = self
            .exchanger
            .exchange()
            .await
            .map_err(AuthError::ExchangeFailed)?;

        let token = AccessToken {
            value: exchanged.access_token,
            expires_at: Utc::now() + Duration::seconds(exchanged.expires_in_seconds),
        };

        info!(expires_at = %token.expires_at, "token cache: access token refreshed");

        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Exchanger that counts calls and yields before answering, wide enough a
    /// window for both callers to pile onto the gate.
    struct CountingExchanger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenExchanger for CountingExchanger {
        async fn exchange(&self) -> Result<ExchangedToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(ExchangedToken {
                access_token: "tok-1".to_string(),
                expires_in_seconds: 3600,
            })
        }
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_exactly_one_exchange() {
        let exchanger = Arc::new(CountingExchanger {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(TokenCache::new(Arc::clone(&exchanger)));

        let a = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.bearer_token().await }
        });
        let b = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.bearer_token().await }
        });

        let token_a = a.await.unwrap().unwrap();
        let token_b = b.await.unwrap().unwrap();

        assert_eq!(token_a, "tok-1");
        assert_eq!(token_b, "tok-1");
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_token_is_served_without_an_exchange() {
        let mut exchanger = MockTokenExchanger::new();
        exchanger.expect_exchange().times(1).returning(|| {
            Ok(ExchangedToken {
                access_token: "tok-fresh".to_string(),
                expires_in_seconds: 3600,
            })
        });

        let cache = TokenCache::new(Arc::new(exchanger));

        // First call exchanges, the next two hit the cache; the mock would
        // panic on a second exchange.
        assert_eq!(cache.bearer_token().await.unwrap(), "tok-fresh");
        assert_eq!(cache.bearer_token().await.unwrap(), "tok-fresh");
        assert_eq!(cache.bearer_token().await.unwrap(), "tok-fresh");
    }

    #[tokio::test]
    async fn token_within_buffer_is_refreshed() {
        let mut exchanger = MockTokenExchanger::new();
        let mut sequence = mockall::Sequence::new();
        exchanger
            .expect_exchange()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| {
                Ok(ExchangedToken {
                    access_token: "tok-short".to_string(),
                    // Inside the 5 minute buffer from the moment it is stored.
                    expires_in_seconds: 60,
                })
            });
        exchanger
            .expect_exchange()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| {
                Ok(ExchangedToken {
                    access_token: "tok-long".to_string(),
                    expires_in_seconds: 3600,
                })
            });

        let cache = TokenCache::new(Arc::new(exchanger));

        assert_eq!(cache.bearer_token().await.unwrap(), "tok-short");
        assert_eq!(cache.bearer_token().await.unwrap(), "tok-long");
    }

    #[tokio::test]
    async fn exchange_failure_propagates_as_auth_error() {
        let mut exchanger = MockTokenExchanger::new();
        exchanger
            .expect_exchange()
            .returning(|| Err(anyhow::anyhow!("identity provider unreachable")));

        let cache = TokenCache::new(Arc::new(exchanger));

        let err = cache.bearer_token().await.unwrap_err();
        assert!(matches!(err, AuthError::ExchangeFailed(_)));
    }

    #[tokio::test]
    async fn token_status_reports_cache_state() {
        let mut exchanger = MockTokenExchanger::new();
        exchanger.expect_exchange().returning(|| {
            Ok(ExchangedToken {
                access_token: "tok-status".to_string(),
                expires_in_seconds: 3600,
            })
        });

        let cache = TokenCache::new(Arc::new(exchanger));

        let before = cache.token_status();
        assert!(!before.has_token);
        assert!(before.expiring_soon);

        cache.refresh().await.unwrap();

        let after = cache.token_status();
        assert!(after.has_token);
        assert!(!after.expiring_soon);
        assert!(after.minutes_until_expiry > 50);
    }
}
