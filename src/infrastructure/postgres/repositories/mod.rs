pub mod payment_notifications;
