use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{
    ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl, SelectableHelper, insert_into,
    update,
};
use uuid::Uuid;

use crate::{
    domain::{
        entities::payment_notifications::{
            NewPaymentNotificationEntity, PaymentNotificationEntity,
        },
        repositories::payment_notifications::{InsertOutcome, PaymentNotificationRepository},
        value_objects::enums::processing_statuses::ProcessingStatus,
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad, schema::payment_notifications,
    },
};

pub struct PaymentNotificationPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentNotificationPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentNotificationRepository for PaymentNotificationPostgres {
    async fn find_by_tracking_key(
        &self,
        tracking_key: &str,
    ) -> Result<Option<PaymentNotificationEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = payment_notifications::table
            .filter(payment_notifications::tracking_key.eq(tracking_key))
            .select(PaymentNotificationEntity::as_select())
            .first::<PaymentNotificationEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn insert(
        &self,
        new_notification: NewPaymentNotificationEntity,
    ) -> Result<InsertOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // The unique index on tracking_key is the idempotency boundary: a
        // concurrent ingestion that lands the same key first turns this
        // insert into a no-op rather than an error.
        let inserted_id = insert_into(payment_notifications::table)
            .values(&new_notification)
            .on_conflict(payment_notifications::tracking_key)
            .do_nothing()
            .returning(payment_notifications::id)
            .get_result::<Uuid>(&mut conn)
            .optional()?;

        Ok(match inserted_id {
            Some(id) => InsertOutcome::Inserted(id),
            None => InsertOutcome::DuplicateTrackingKey,
        })
    }

    async fn update_status(&self, id: Uuid, status: ProcessingStatus) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(payment_notifications::table.filter(payment_notifications::id.eq(id)))
            .set((
                payment_notifications::status.eq(status.to_string()),
                payment_notifications::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
