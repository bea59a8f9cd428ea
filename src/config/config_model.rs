#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub graph: Graph,
    pub webhook: Webhook,
    pub ingestion: Ingestion,
    pub netsuite: NetSuite,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Graph {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub user_id: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Webhook {
    pub notification_url: String,
    pub client_state: String,
    pub auto_create: bool,
}

#[derive(Debug, Clone)]
pub struct Ingestion {
    pub queue_capacity: usize,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct NetSuite {
    pub enabled: bool,
    pub account_id: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token_id: String,
    pub token_secret: String,
    pub base_url: String,
}
