use std::sync::RwLock;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    domain::value_objects::webhook_status::WebhookStatusDto,
    infrastructure::graph::graph_client::{
        GraphClient, SubscriptionRequest, SubscriptionResource,
    },
};

/// Mail subscriptions are capped by the provider at roughly three days; the
/// margin keeps the requested expiry safely under the cap.
pub const PROVIDER_MAX_LIFETIME_HOURS: i64 = 72;
pub const CREATION_MARGIN_HOURS: i64 = 1;
pub const RENEWAL_THRESHOLD_HOURS: i64 = 24;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionGateway: Send + Sync {
    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> AnyResult<SubscriptionResource>;

    async fn renew_subscription(
        &self,
        subscription_id: String,
        expires_at: DateTime<Utc>,
    ) -> AnyResult<SubscriptionResource>;

    async fn delete_subscription(&self, subscription_id: String) -> AnyResult<()>;

    async fn list_subscriptions(&self) -> AnyResult<Vec<SubscriptionResource>>;
}

#[async_trait]
impl SubscriptionGateway for GraphClient {
    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> AnyResult<SubscriptionResource> {
        self.create_subscription(&request).await
    }

    async fn renew_subscription(
        &self,
        subscription_id: String,
        expires_at: DateTime<Utc>,
    ) -> AnyResult<SubscriptionResource> {
        self.renew_subscription(&subscription_id, expires_at).await
    }

    async fn delete_subscription(&self, subscription_id: String) -> AnyResult<()> {
        self.delete_subscription(&subscription_id).await
    }

    async fn list_subscriptions(&self) -> AnyResult<Vec<SubscriptionResource>> {
        self.list_subscriptions().await
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("subscription operation failed: {0}")]
    Subscription(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LifecycleError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            LifecycleError::Subscription(_) => StatusCode::BAD_GATEWAY,
            LifecycleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// Immutable settings the subscription is created with.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// The watched resource, e.g. "/users/{id}/messages".
    pub resource: String,
    pub notification_url: String,
    pub client_state: String,
}

#[derive(Debug, Clone)]
enum LifecycleState {
    Uninitialized,
    Active {
        subscription_id: String,
        expires_at: DateTime<Utc>,
    },
    Failed {
        message: String,
    },
}

/// Owns the remote push subscription's identity and expiry. All mutation
/// goes through the named transitions below; `status()` always observes the
/// id/expiry pair as one snapshot.
pub struct SubscriptionLifecycle<G>
where
    G: SubscriptionGateway + 'static,
{
    gateway: std::sync::Arc<G>,
    settings: WebhookSettings,
    state: RwLock<LifecycleState>,
}

impl<G> SubscriptionLifecycle<G>
where
    G: SubscriptionGateway + 'static,
{
    pub fn new(gateway: std::sync::Arc<G>, settings: WebhookSettings) -> Self {
        Self {
            gateway,
            settings,
            state: RwLock::new(LifecycleState::Uninitialized),
        }
    }

    /// Startup path: best-effort cleanup of stale subscriptions on our
    /// resource, then a fresh create. A create failure is fatal to the call
    /// and leaves the manager failed until the next scheduled tick.
    pub async fn initialize(&self) -> LifecycleResult<()> {
        info!(resource = %self.settings.resource, "lifecycle: initializing webhook subscription");
        self.cleanup_existing().await;
        self.create().await?;
        info!("lifecycle: webhook initialization completed");
        Ok(())
    }

    /// Deletes every remote subscription watching our resource. Best-effort
    /// and idempotent: stale subscriptions are preferable to no subscription,
    /// so failures are logged and never block the create that follows.
    pub async fn cleanup_existing(&self) -> usize {
        info!("lifecycle: cleaning up existing subscriptions");

        let subscriptions = match self.gateway.list_subscriptions().await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                warn!(error = ?err, "lifecycle: could not list existing subscriptions");
                return 0;
            }
        };

        let mut deleted = 0;
        for subscription in subscriptions {
            if subscription.resource.as_deref() != Some(self.settings.resource.as_str()) {
                continue;
            }

            info!(subscription_id = %subscription.id, "lifecycle: deleting stale subscription");
            match self.gateway.delete_subscription(subscription.id.clone()).await {
                Ok(()) => deleted += 1,
                Err(err) => {
                    warn!(
                        subscription_id = %subscription.id,
                        error = ?err,
                        "lifecycle: failed to delete stale subscription"
                    );
                }
            }
        }

        info!(deleted, "lifecycle: cleanup finished");
        deleted
    }

    pub async fn create(&self) -> LifecycleResult<()> {
        let expires_at = Self::target_expiry(Utc::now());
        let request = SubscriptionRequest::created(
            &self.settings.resource,
            &self.settings.notification_url,
            &self.settings.client_state,
            expires_at,
        );

        info!(
            resource = %self.settings.resource,
            notification_url = %self.settings.notification_url,
            expires_at = %expires_at,
            "lifecycle: creating webhook subscription"
        );

        match self.gateway.create_subscription(request).await {
            Ok(created) => {
                info!(
                    subscription_id = %created.id,
                    expires_at = %created.expiration_date_time,
                    "lifecycle: subscription created"
                );
                self.set_active(created.id, created.expiration_date_time);
                Ok(())
            }
            Err(err) => {
                let message = format!("subscription creation failed: {err}");
                error!(error = ?err, "lifecycle: subscription creation failed");
                self.set_failed(message.clone());
                Err(LifecycleError::Subscription(message))
            }
        }
    }

    /// Scheduled tick. Creates when nothing is tracked, renews when the
    /// expiry is inside the renewal threshold, and otherwise does nothing.
    /// Errors never escape: a failed tick degrades state and waits for the
    /// next one.
    pub async fn check_and_renew(&self) {
        let tracked = self.active_snapshot();

        let Some((subscription_id, expires_at)) = tracked else {
            warn!("lifecycle: no active subscription tracked, creating a new one");
            if let Err(err) = self.create().await {
                error!(error = ?err, "lifecycle: scheduled create failed");
            }
            return;
        };

        let renewal_threshold = Utc::now() + Duration::hours(RENEWAL_THRESHOLD_HOURS);
        if expires_at >= renewal_threshold {
            debug!(
                subscription_id = %subscription_id,
                expires_at = %expires_at,
                "lifecycle: subscription still valid, nothing to do"
            );
            return;
        }

        info!(
            subscription_id = %subscription_id,
            expires_at = %expires_at,
            "lifecycle: subscription expiring soon, renewing"
        );
        if let Err(err) = self.renew().await {
            error!(error = ?err, "lifecycle: scheduled renewal failed");
        }
    }

    /// Extends the tracked subscription's expiry. A provider failure (for
    /// example the subscription was deleted remotely) degrades to the full
    /// cleanup-then-create path instead of looping on renewal.
    pub async fn renew(&self) -> LifecycleResult<()> {
        let Some((subscription_id, _)) = self.active_snapshot() else {
            return self.create().await;
        };

        let expires_at = Self::target_expiry(Utc::now());
        match self
            .gateway
            .renew_subscription(subscription_id.clone(), expires_at)
            .await
        {
            Ok(renewed) => {
                info!(
                    subscription_id = %subscription_id,
                    expires_at = %renewed.expiration_date_time,
                    "lifecycle: subscription renewed"
                );
                self.set_active(subscription_id, renewed.expiration_date_time);
                Ok(())
            }
            Err(err) => {
                warn!(
                    subscription_id = %subscription_id,
                    error = ?err,
                    "lifecycle: renewal failed, recreating subscription"
                );
                self.recreate().await
            }
        }
    }

    /// Full cleanup-then-create, also exposed to the admin surface.
    pub async fn recreate(&self) -> LifecycleResult<()> {
        info!("lifecycle: recreating webhook subscription");
        self.cleanup_existing().await;
        self.create().await
    }

    /// Read-only projection; safe to call concurrently with a renewal.
    pub fn status(&self) -> WebhookStatusDto {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());

        let (active, subscription_id, expires_at, message) = match &*state {
            LifecycleState::Uninitialized => {
                (false, None, None, "No active subscription".to_string())
            }
            LifecycleState::Active {
                subscription_id,
                expires_at,
            } => (
                true,
                Some(subscription_id.clone()),
                Some(*expires_at),
                "Subscription is active".to_string(),
            ),
            LifecycleState::Failed { message } => (false, None, None, message.clone()),
        };

        WebhookStatusDto {
            active,
            subscription_id,
            expires_at,
            resource: self.settings.resource.clone(),
            notification_url: self.settings.notification_url.clone(),
            client_state: self.settings.client_state.clone(),
            message,
        }
    }

    pub fn settings(&self) -> &WebhookSettings {
        &self.settings
    }

    pub async fn list_remote(&self) -> LifecycleResult<Vec<SubscriptionResource>> {
        self.gateway
            .list_subscriptions()
            .await
            .map_err(|err| LifecycleError::Subscription(format!("listing failed: {err}")))
    }

    pub async fn delete_remote(&self, subscription_id: &str) -> LifecycleResult<()> {
        self.gateway
            .delete_subscription(subscription_id.to_string())
            .await
            .map_err(|err| LifecycleError::Subscription(format!("deletion failed: {err}")))
    }

    fn target_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(PROVIDER_MAX_LIFETIME_HOURS - CREATION_MARGIN_HOURS)
    }

    fn active_snapshot(&self) -> Option<(String, DateTime<Utc>)> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match &*state {
            LifecycleState::Active {
                subscription_id,
                expires_at,
            } => Some((subscription_id.clone(), *expires_at)),
            _ => None,
        }
    }

    fn set_active(&self, subscription_id: String, expires_at: DateTime<Utc>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = LifecycleState::Active {
            subscription_id,
            expires_at,
        };
    }

    fn set_failed(&self, message: String) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = LifecycleState::Failed { message };
    }
}
