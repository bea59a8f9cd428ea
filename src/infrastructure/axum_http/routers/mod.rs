pub mod graph_webhook;
pub mod webhook_admin;
