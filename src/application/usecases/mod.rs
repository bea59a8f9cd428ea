pub mod email_parser;
pub mod notification_ingestion;
pub mod subscription_lifecycle;
