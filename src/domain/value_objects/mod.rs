pub mod enums;
pub mod graph_notifications;
pub mod payment_fields;
pub mod webhook_status;
