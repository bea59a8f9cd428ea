pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    application::usecases::{
        notification_ingestion::NotificationIngestionUseCase,
        subscription_lifecycle::{SubscriptionLifecycle, WebhookSettings},
    },
    infrastructure::{
        axum_http::{http_serve, routers::webhook_admin::AdminState},
        background::{
            self, RENEWAL_CHECK_INTERVAL, STARTUP_DELAY, TOKEN_REFRESH_INTERVAL,
            ingestion_queue::start_ingestion_workers,
        },
        graph::{graph_client::GraphClient, oauth::OAuthTokenClient, token_cache::TokenCache},
        netsuite::netsuite_client::NetSuiteClient,
        postgres::{postgres_connection, repositories::payment_notifications::PaymentNotificationPostgres},
    },
};

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = Arc::new(postgres_connection::establish_connection(
        &config.database.url,
    )?);
    info!("Postgres connection has been established");

    let token_client = OAuthTokenClient::new(
        &config.graph.tenant_id,
        config.graph.client_id.clone(),
        config.graph.client_secret.clone(),
    );
    let tokens = Arc::new(TokenCache::new(Arc::new(token_client)));

    let graph_client = Arc::new(GraphClient::new(
        config.graph.base_url.clone(),
        config.graph.user_id.clone(),
        Arc::clone(&tokens),
    )?);

    let netsuite_client = Arc::new(NetSuiteClient::new(
        config.netsuite.account_id.clone(),
        config.netsuite.consumer_key.clone(),
        config.netsuite.consumer_secret.clone(),
        config.netsuite.token_id.clone(),
        config.netsuite.token_secret.clone(),
        config.netsuite.base_url.clone(),
    ));

    let repository = Arc::new(PaymentNotificationPostgres::new(Arc::clone(&postgres_pool)));

    let ingestion_usecase = Arc::new(NotificationIngestionUseCase::new(
        repository,
        Arc::clone(&graph_client),
        netsuite_client,
        config.webhook.client_state.clone(),
        config.netsuite.enabled,
    ));

    let (queue, _workers) = start_ingestion_workers(
        ingestion_usecase,
        config.ingestion.queue_capacity,
        config.ingestion.workers,
    );

    let settings = WebhookSettings {
        resource: format!("/users/{}/messages", config.graph.user_id),
        notification_url: config.webhook.notification_url.clone(),
        client_state: config.webhook.client_state.clone(),
    };
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        Arc::clone(&graph_client),
        settings,
    ));

    background::spawn_token_refresh(Arc::clone(&tokens), TOKEN_REFRESH_INTERVAL);
    if config.webhook.auto_create {
        background::spawn_subscription_maintenance(
            Arc::clone(&lifecycle),
            STARTUP_DELAY,
            RENEWAL_CHECK_INTERVAL,
        );
    } else {
        info!("lifecycle: automatic subscription creation is disabled");
    }

    let admin_state = AdminState { lifecycle, tokens };
    http_serve::start(config, Arc::new(queue), admin_state).await?;

    Ok(())
}
