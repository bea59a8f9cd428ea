pub mod ingestion_queue;

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    application::usecases::subscription_lifecycle::{SubscriptionGateway, SubscriptionLifecycle},
    infrastructure::graph::token_cache::{TokenCache, TokenExchanger},
};

/// Access tokens live about an hour; refreshing every 50 minutes keeps
/// foreground callers off the synchronous exchange path.
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(50 * 60);
pub const RENEWAL_CHECK_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
/// Gives the credential cache time to obtain its first token before the
/// subscription setup runs.
pub const STARTUP_DELAY: Duration = Duration::from_secs(30);

/// Proactive token refresh loop. A failed tick is logged and retried on the
/// next one; it never takes the task down.
pub fn spawn_token_refresh<E>(
    tokens: Arc<TokenCache<E>>,
    interval: Duration,
) -> JoinHandle<()>
where
    E: TokenExchanger + 'static,
{
    tokio::spawn(async move {
        info!("background: token refresh task started");

        if let Err(err) = tokens.refresh().await {
            error!(error = ?err, "background: initial token refresh failed");
        }

        loop {
            tokio::time::sleep(interval).await;
            if let Err(err) = tokens.refresh().await {
                error!(error = ?err, "background: token refresh tick failed, retrying next tick");
            }
        }
    })
}

/// Subscription maintenance loop: one-time initialization after the startup
/// delay, then periodic renewal checks. `check_and_renew` already swallows
/// its own errors, so a bad tick can never unschedule the next one.
pub fn spawn_subscription_maintenance<G>(
    lifecycle: Arc<SubscriptionLifecycle<G>>,
    startup_delay: Duration,
    interval: Duration,
) -> JoinHandle<()>
where
    G: SubscriptionGateway + 'static,
{
    tokio::spawn(async move {
        info!(
            startup_delay_secs = startup_delay.as_secs(),
            "background: subscription maintenance task started"
        );
        tokio::time::sleep(startup_delay).await;

        if let Err(err) = lifecycle.initialize().await {
            error!(error = ?err, "background: webhook initialization failed, will retry on next tick");
        }

        loop {
            tokio::time::sleep(interval).await;
            lifecycle.check_and_renew().await;
        }
    })
}
