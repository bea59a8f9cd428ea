pub mod axum_http;
pub mod background;
pub mod graph;
pub mod netsuite;
pub mod postgres;
