pub mod graph_client;
pub mod oauth;
pub mod token_cache;
