use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::payment_notifications;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payment_notifications)]
pub struct PaymentNotificationEntity {
    pub id: Uuid,
    pub tracking_key: String,
    pub source_account: Option<String>,
    pub payer_name: Option<String>,
    pub payment_concept: Option<String>,
    pub reference: Option<String>,
    pub issuing_institution: Option<String>,
    pub amount: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payment_notifications)]
pub struct NewPaymentNotificationEntity {
    pub tracking_key: String,
    pub source_account: Option<String>,
    pub payer_name: Option<String>,
    pub payment_concept: Option<String>,
    pub reference: Option<String>,
    pub issuing_institution: Option<String>,
    pub amount: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub status: String,
}
