use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::payment_notifications::{NewPaymentNotificationEntity, PaymentNotificationEntity},
    value_objects::enums::processing_statuses::ProcessingStatus,
};

/// Outcome of an insert guarded by the unique index on `tracking_key`.
/// A lost race against a concurrent ingestion is a `DuplicateTrackingKey`,
/// never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Uuid),
    DuplicateTrackingKey,
}

#[automock]
#[async_trait]
pub trait PaymentNotificationRepository {
    async fn find_by_tracking_key(
        &self,
        tracking_key: &str,
    ) -> Result<Option<PaymentNotificationEntity>>;

    async fn insert(&self, new_notification: NewPaymentNotificationEntity)
    -> Result<InsertOutcome>;

    async fn update_status(&self, id: Uuid, status: ProcessingStatus) -> Result<()>;
}
