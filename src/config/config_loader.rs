use anyhow::Result;

use super::config_model::{
    Database, DotEnvyConfig, Graph, Ingestion, NetSuite, Server, Webhook,
};

const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_NETSUITE_BASE_URL: &str = "suitetalk.api.netsuite.com";
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_WORKERS: usize = 2;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let graph = Graph {
        tenant_id: std::env::var("GRAPH_TENANT_ID").expect("GRAPH_TENANT_ID is invalid"),
        client_id: std::env::var("GRAPH_CLIENT_ID").expect("GRAPH_CLIENT_ID is invalid"),
        client_secret: std::env::var("GRAPH_CLIENT_SECRET")
            .expect("GRAPH_CLIENT_SECRET is invalid"),
        user_id: std::env::var("GRAPH_USER_ID").expect("GRAPH_USER_ID is invalid"),
        base_url: std::env::var("GRAPH_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GRAPH_BASE_URL.to_string()),
    };

    let webhook = Webhook {
        notification_url: std::env::var("WEBHOOK_NOTIFICATION_URL")
            .expect("WEBHOOK_NOTIFICATION_URL is invalid"),
        client_state: std::env::var("WEBHOOK_CLIENT_STATE")
            .expect("WEBHOOK_CLIENT_STATE is invalid"),
        auto_create: parse_bool("WEBHOOK_AUTO_CREATE", true)?,
    };

    let ingestion = Ingestion {
        queue_capacity: match std::env::var("INGEST_QUEUE_CAPACITY") {
            Ok(raw) => raw.parse()?,
            Err(_) => DEFAULT_QUEUE_CAPACITY,
        },
        workers: match std::env::var("INGEST_WORKERS") {
            Ok(raw) => raw.parse()?,
            Err(_) => DEFAULT_WORKERS,
        },
    };

    let netsuite_enabled = parse_bool("NETSUITE_ENABLED", true)?;
    let netsuite = if netsuite_enabled {
        NetSuite {
            enabled: true,
            account_id: std::env::var("NETSUITE_ACCOUNT_ID")
                .expect("NETSUITE_ACCOUNT_ID is invalid"),
            consumer_key: std::env::var("NETSUITE_CONSUMER_KEY")
                .expect("NETSUITE_CONSUMER_KEY is invalid"),
            consumer_secret: std::env::var("NETSUITE_CONSUMER_SECRET")
                .expect("NETSUITE_CONSUMER_SECRET is invalid"),
            token_id: std::env::var("NETSUITE_TOKEN_ID").expect("NETSUITE_TOKEN_ID is invalid"),
            token_secret: std::env::var("NETSUITE_TOKEN_SECRET")
                .expect("NETSUITE_TOKEN_SECRET is invalid"),
            base_url: std::env::var("NETSUITE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_NETSUITE_BASE_URL.to_string()),
        }
    } else {
        // Credentials are not required when the downstream applier is off.
        NetSuite {
            enabled: false,
            account_id: std::env::var("NETSUITE_ACCOUNT_ID").unwrap_or_default(),
            consumer_key: std::env::var("NETSUITE_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: std::env::var("NETSUITE_CONSUMER_SECRET").unwrap_or_default(),
            token_id: std::env::var("NETSUITE_TOKEN_ID").unwrap_or_default(),
            token_secret: std::env::var("NETSUITE_TOKEN_SECRET").unwrap_or_default(),
            base_url: std::env::var("NETSUITE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_NETSUITE_BASE_URL.to_string()),
        }
    };

    Ok(DotEnvyConfig {
        server,
        database,
        graph,
        webhook,
        ingestion,
        netsuite,
    })
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(raw) => Ok(raw.parse()?),
        Err(_) => Ok(default),
    }
}
