use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{error, info, warn};

use crate::{
    application::usecases::email_parser,
    domain::{
        entities::payment_notifications::{
            NewPaymentNotificationEntity, PaymentNotificationEntity,
        },
        repositories::payment_notifications::{InsertOutcome, PaymentNotificationRepository},
        value_objects::{
            enums::processing_statuses::ProcessingStatus,
            graph_notifications::{GraphNotificationBatch, NotificationValue},
            payment_fields::PaymentFields,
        },
    },
    infrastructure::{
        graph::graph_client::{GraphClient, MessageResource},
        netsuite::netsuite_client::NetSuiteClient,
    },
};

const APPLIED_AT_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailGateway: Send + Sync {
    async fn fetch_message(&self, message_id: String) -> AnyResult<MessageResource>;
    async fn mark_message_read(&self, message_id: String) -> AnyResult<()>;
}

#[async_trait]
impl MailGateway for GraphClient {
    async fn fetch_message(&self, message_id: String) -> AnyResult<MessageResource> {
        self.fetch_message(&message_id).await
    }

    async fn mark_message_read(&self, message_id: String) -> AnyResult<()> {
        self.mark_message_read(&message_id).await
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentApplier: Send + Sync {
    async fn apply_payment(&self, payment: PaymentNotificationEntity) -> AnyResult<()>;
}

#[async_trait]
impl PaymentApplier for NetSuiteClient {
    async fn apply_payment(&self, payment: PaymentNotificationEntity) -> AnyResult<()> {
        self.apply_payment(&payment).await
    }
}

/// Processes inbound webhook deliveries: fetch the referenced message,
/// extract payment fields, persist idempotently by tracking key, and hand
/// the record to the downstream applier. Per-notification failures are
/// logged skips; nothing aborts the batch.
pub struct NotificationIngestionUseCase<R, G, A>
where
    R: PaymentNotificationRepository + Send + Sync + 'static,
    G: MailGateway + 'static,
    A: PaymentApplier + 'static,
{
    repository: Arc<R>,
    mail: Arc<G>,
    applier: Arc<A>,
    expected_client_state: String,
    apply_downstream: bool,
}

impl<R, G, A> NotificationIngestionUseCase<R, G, A>
where
    R: PaymentNotificationRepository + Send + Sync + 'static,
    G: MailGateway + 'static,
    A: PaymentApplier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        mail: Arc<G>,
        applier: Arc<A>,
        expected_client_state: String,
        apply_downstream: bool,
    ) -> Self {
        Self {
            repository,
            mail,
            applier,
            expected_client_state,
            apply_downstream,
        }
    }

    /// Entry point for one webhook delivery. The raw body is parsed here so
    /// that the HTTP handler can acknowledge before any processing happens.
    pub async fn ingest(&self, raw_body: &str) {
        let batch: GraphNotificationBatch = match serde_json::from_str(raw_body) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "ingestion: notification body is not a valid batch");
                return;
            }
        };

        info!(batch_size = batch.value.len(), "ingestion: processing notification batch");

        for value in &batch.value {
            self.process_notification(value).await;
        }
    }

    async fn process_notification(&self, value: &NotificationValue) {
        let Some(message_id) = value
            .resource_data
            .as_ref()
            .and_then(|data| data.id.as_deref())
        else {
            warn!("ingestion: notification has no resource data, skipping");
            return;
        };

        if let Some(client_state) = value.client_state.as_deref() {
            if client_state != self.expected_client_state {
                warn!(%message_id, "ingestion: client state mismatch, skipping");
                return;
            }
        }

        info!(%message_id, "ingestion: processing notification");

        let message = match self.mail.fetch_message(message_id.to_string()).await {
            Ok(message) => message,
            Err(err) => {
                warn!(%message_id, error = ?err, "ingestion: message fetch failed, skipping");
                return;
            }
        };

        let Some(body) = message
            .body
            .as_ref()
            .and_then(|body| body.content.as_deref())
            .filter(|content| !content.is_empty())
        else {
            warn!(%message_id, "ingestion: message has no body, skipping");
            return;
        };

        let fields = email_parser::parse(body);

        let Some(tracking_key) = fields.tracking_key.clone() else {
            warn!(%message_id, "ingestion: no tracking key found in message, skipping");
            return;
        };

        // Primary defense against at-least-once redelivery.
        match self.repository.find_by_tracking_key(&tracking_key).await {
            Ok(Some(_)) => {
                info!(%tracking_key, "ingestion: payment already recorded, skipping");
                return;
            }
            Ok(None) => {}
            Err(err) => {
                error!(%tracking_key, error = ?err, "ingestion: duplicate lookup failed, skipping");
                return;
            }
        }

        let new_notification = build_entity(&fields, tracking_key.clone());
        let record_id = match self.repository.insert(new_notification).await {
            Ok(InsertOutcome::Inserted(id)) => id,
            Ok(InsertOutcome::DuplicateTrackingKey) => {
                // Lost the race against a concurrent delivery; same as a skip.
                info!(%tracking_key, "ingestion: concurrent delivery already recorded, skipping");
                return;
            }
            Err(err) => {
                error!(%tracking_key, error = ?err, "ingestion: persist failed, skipping");
                return;
            }
        };

        info!(
            %tracking_key,
            %record_id,
            amount = ?fields.amount,
            payer_name = ?fields.payer_name,
            "ingestion: payment recorded"
        );

        // Best effort; a failure here never rolls back the persisted record.
        if let Err(err) = self.mail.mark_message_read(message_id.to_string()).await {
            warn!(%message_id, error = ?err, "ingestion: failed to mark message as read");
        }

        if !self.apply_downstream {
            return;
        }

        let persisted = match self.repository.find_by_tracking_key(&tracking_key).await {
            Ok(Some(entity)) => entity,
            Ok(None) | Err(_) => {
                error!(%tracking_key, "ingestion: persisted record could not be reloaded");
                return;
            }
        };

        match self.applier.apply_payment(persisted).await {
            Ok(()) => {
                info!(%tracking_key, "ingestion: payment applied downstream");
                if let Err(err) = self
                    .repository
                    .update_status(record_id, ProcessingStatus::Applied)
                    .await
                {
                    error!(%tracking_key, error = ?err, "ingestion: failed to mark record applied");
                }
            }
            Err(err) => {
                error!(%tracking_key, error = ?err, "ingestion: downstream apply failed");
                if let Err(err) = self
                    .repository
                    .update_status(record_id, ProcessingStatus::ApplyFailed)
                    .await
                {
                    error!(%tracking_key, error = ?err, "ingestion: failed to mark record apply-failed");
                }
            }
        }
    }
}

fn build_entity(fields: &PaymentFields, tracking_key: String) -> NewPaymentNotificationEntity {
    NewPaymentNotificationEntity {
        tracking_key,
        source_account: fields.source_account.clone(),
        payer_name: fields.payer_name.clone(),
        payment_concept: fields.payment_concept.clone(),
        reference: fields.reference.clone(),
        issuing_institution: fields.issuing_institution.clone(),
        amount: fields.amount.clone(),
        applied_at: fields.applied_at.as_deref().and_then(parse_applied_at),
        received_at: Utc::now(),
        status: ProcessingStatus::Received.to_string(),
    }
}

fn parse_applied_at(raw: &str) -> Option<DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(raw.trim(), APPLIED_AT_FORMAT) {
        Ok(naive) => Some(Utc.from_utc_datetime(&naive)),
        Err(err) => {
            warn!(raw_date = raw, error = %err, "ingestion: could not parse application date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use uuid::Uuid;

    use super::*;
    use crate::{
        domain::repositories::payment_notifications::MockPaymentNotificationRepository,
        infrastructure::graph::graph_client::MessageBody,
    };

    const CLIENT_STATE: &str = "secret-state";

    fn usecase(
        repository: MockPaymentNotificationRepository,
        mail: MockMailGateway,
        applier: MockPaymentApplier,
    ) -> NotificationIngestionUseCase<
        MockPaymentNotificationRepository,
        MockMailGateway,
        MockPaymentApplier,
    > {
        NotificationIngestionUseCase::new(
            Arc::new(repository),
            Arc::new(mail),
            Arc::new(applier),
            CLIENT_STATE.to_string(),
            true,
        )
    }

    fn batch_body(message_id: &str) -> String {
        serde_json::json!({
            "value": [{
                "subscriptionId": "sub-1",
                "clientState": CLIENT_STATE,
                "resource": "/users/mailbox-1/messages",
                "resourceData": {
                    "@odata.type": "#Microsoft.Graph.Message",
                    "@odata.id": format!("Users/mailbox-1/Messages/{message_id}"),
                    "id": message_id,
                }
            }]
        })
        .to_string()
    }

    fn message_with_body(content: &str) -> MessageResource {
        MessageResource {
            subject: Some("Notificación de pago".to_string()),
            from: None,
            body: Some(MessageBody {
                content_type: Some("html".to_string()),
                content: Some(content.to_string()),
            }),
        }
    }

    fn persisted_entity(tracking_key: &str, id: Uuid) -> PaymentNotificationEntity {
        PaymentNotificationEntity {
            id,
            tracking_key: tracking_key.to_string(),
            source_account: Some("*****8016".to_string()),
            payer_name: Some("JUANA ELVIRA CHAPARRO LOYA".to_string()),
            payment_concept: Some("PAGO FACTURA F-4410".to_string()),
            reference: Some("1402577".to_string()),
            issuing_institution: Some("STP".to_string()),
            amount: Some("1234.56".to_string()),
            applied_at: None,
            received_at: Utc::now(),
            status: ProcessingStatus::Received.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    const PAYMENT_EMAIL: &str = "Cuenta origen *****8016 JUANA ELVIRA CHAPARRO LOYA \
        Cantidad $1,234.56 Clave de rastreo SPIN123ABC Referencia 1402577";

    #[tokio::test]
    async fn persists_and_applies_a_new_payment() {
        let record_id = Uuid::new_v4();

        let mut mail = MockMailGateway::new();
        mail.expect_fetch_message()
            .with(eq("m1".to_string()))
            .times(1)
            .returning(|_| Ok(message_with_body(PAYMENT_EMAIL)));
        mail.expect_mark_message_read()
            .with(eq("m1".to_string()))
            .times(1)
            .returning(|_| Ok(()));

        let mut repository = MockPaymentNotificationRepository::new();
        let mut lookups = mockall::Sequence::new();
        repository
            .expect_find_by_tracking_key()
            .with(eq("SPIN123ABC"))
            .times(1)
            .in_sequence(&mut lookups)
            .returning(|_| Ok(None));
        repository
            .expect_insert()
            .withf(|new| {
                new.tracking_key == "SPIN123ABC"
                    && new.amount.as_deref() == Some("1234.56")
                    && new.status == "RECEIVED"
            })
            .times(1)
            .in_sequence(&mut lookups)
            .returning(move |_| Ok(InsertOutcome::Inserted(record_id)));
        repository
            .expect_find_by_tracking_key()
            .with(eq("SPIN123ABC"))
            .times(1)
            .in_sequence(&mut lookups)
            .returning(move |_| Ok(Some(persisted_entity("SPIN123ABC", record_id))));
        repository
            .expect_update_status()
            .with(eq(record_id), eq(ProcessingStatus::Applied))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut applier = MockPaymentApplier::new();
        applier
            .expect_apply_payment()
            .withf(|payment| payment.tracking_key == "SPIN123ABC")
            .times(1)
            .returning(|_| Ok(()));

        usecase(repository, mail, applier)
            .ingest(&batch_body("m1"))
            .await;
    }

    #[tokio::test]
    async fn redelivery_of_a_recorded_payment_inserts_nothing() {
        let record_id = Uuid::new_v4();

        let mut mail = MockMailGateway::new();
        mail.expect_fetch_message()
            .times(1)
            .returning(|_| Ok(message_with_body(PAYMENT_EMAIL)));

        let mut repository = MockPaymentNotificationRepository::new();
        repository
            .expect_find_by_tracking_key()
            .with(eq("SPIN123ABC"))
            .times(1)
            .returning(move |_| Ok(Some(persisted_entity("SPIN123ABC", record_id))));
        // No insert/update expectations: any write would panic.

        let applier = MockPaymentApplier::new();

        usecase(repository, mail, applier)
            .ingest(&batch_body("m1"))
            .await;
    }

    #[tokio::test]
    async fn insert_race_loser_treats_duplicate_as_skip() {
        let mut mail = MockMailGateway::new();
        mail.expect_fetch_message()
            .times(1)
            .returning(|_| Ok(message_with_body(PAYMENT_EMAIL)));

        let mut repository = MockPaymentNotificationRepository::new();
        repository
            .expect_find_by_tracking_key()
            .times(1)
            .returning(|_| Ok(None));
        repository
            .expect_insert()
            .times(1)
            .returning(|_| Ok(InsertOutcome::DuplicateTrackingKey));

        let applier = MockPaymentApplier::new();

        usecase(repository, mail, applier)
            .ingest(&batch_body("m1"))
            .await;
    }

    #[tokio::test]
    async fn message_without_tracking_key_is_skipped() {
        let mut mail = MockMailGateway::new();
        mail.expect_fetch_message()
            .times(1)
            .returning(|_| Ok(message_with_body("Saludos cordiales, sin datos de pago")));

        // Repository untouched: extraction never produced a tracking key.
        let repository = MockPaymentNotificationRepository::new();
        let applier = MockPaymentApplier::new();

        usecase(repository, mail, applier)
            .ingest(&batch_body("m1"))
            .await;
    }

    #[tokio::test]
    async fn fetch_failure_skips_one_notification_and_continues_the_batch() {
        let record_id = Uuid::new_v4();
        let body = serde_json::json!({
            "value": [
                { "clientState": CLIENT_STATE, "resourceData": { "id": "m-bad" } },
                { "clientState": CLIENT_STATE, "resourceData": { "id": "m-good" } },
            ]
        })
        .to_string();

        let mut mail = MockMailGateway::new();
        mail.expect_fetch_message()
            .with(eq("m-bad".to_string()))
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("request timed out")));
        mail.expect_fetch_message()
            .with(eq("m-good".to_string()))
            .times(1)
            .returning(|_| Ok(message_with_body(PAYMENT_EMAIL)));
        mail.expect_mark_message_read().returning(|_| Ok(()));

        let mut repository = MockPaymentNotificationRepository::new();
        repository
            .expect_find_by_tracking_key()
            .returning(move |_| Ok(Some(persisted_entity("SPIN123ABC", record_id))))
            .times(1)
            .with(eq("SPIN123ABC"));

        let applier = MockPaymentApplier::new();

        usecase(repository, mail, applier).ingest(&body).await;
    }

    #[tokio::test]
    async fn notification_without_resource_data_is_skipped() {
        let body = serde_json::json!({
            "value": [{ "subscriptionId": "sub-1", "clientState": CLIENT_STATE }]
        })
        .to_string();

        // Nothing is fetched or written.
        let mail = MockMailGateway::new();
        let repository = MockPaymentNotificationRepository::new();
        let applier = MockPaymentApplier::new();

        usecase(repository, mail, applier).ingest(&body).await;
    }

    #[tokio::test]
    async fn client_state_mismatch_is_rejected() {
        let body = serde_json::json!({
            "value": [{ "clientState": "spoofed", "resourceData": { "id": "m1" } }]
        })
        .to_string();

        let mail = MockMailGateway::new();
        let repository = MockPaymentNotificationRepository::new();
        let applier = MockPaymentApplier::new();

        usecase(repository, mail, applier).ingest(&body).await;
    }

    #[tokio::test]
    async fn downstream_failure_marks_record_apply_failed() {
        let record_id = Uuid::new_v4();

        let mut mail = MockMailGateway::new();
        mail.expect_fetch_message()
            .times(1)
            .returning(|_| Ok(message_with_body(PAYMENT_EMAIL)));
        mail.expect_mark_message_read().returning(|_| Ok(()));

        let mut repository = MockPaymentNotificationRepository::new();
        let mut lookups = mockall::Sequence::new();
        repository
            .expect_find_by_tracking_key()
            .times(1)
            .in_sequence(&mut lookups)
            .returning(|_| Ok(None));
        repository
            .expect_insert()
            .times(1)
            .in_sequence(&mut lookups)
            .returning(move |_| Ok(InsertOutcome::Inserted(record_id)));
        repository
            .expect_find_by_tracking_key()
            .times(1)
            .in_sequence(&mut lookups)
            .returning(move |_| Ok(Some(persisted_entity("SPIN123ABC", record_id))));
        repository
            .expect_update_status()
            .with(eq(record_id), eq(ProcessingStatus::ApplyFailed))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut applier = MockPaymentApplier::new();
        applier
            .expect_apply_payment()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("invoice not found")));

        usecase(repository, mail, applier)
            .ingest(&batch_body("m1"))
            .await;
    }

    #[tokio::test]
    async fn mark_read_failure_does_not_block_the_downstream_apply() {
        let record_id = Uuid::new_v4();

        let mut mail = MockMailGateway::new();
        mail.expect_fetch_message()
            .times(1)
            .returning(|_| Ok(message_with_body(PAYMENT_EMAIL)));
        mail.expect_mark_message_read()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("patch rejected")));

        let mut repository = MockPaymentNotificationRepository::new();
        repository
            .expect_find_by_tracking_key()
            .returning(move |_| Ok(None))
            .times(1);
        repository
            .expect_insert()
            .times(1)
            .returning(move |_| Ok(InsertOutcome::Inserted(record_id)));
        repository
            .expect_find_by_tracking_key()
            .times(1)
            .returning(move |_| Ok(Some(persisted_entity("SPIN123ABC", record_id))));
        repository
            .expect_update_status()
            .with(eq(record_id), eq(ProcessingStatus::Applied))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut applier = MockPaymentApplier::new();
        applier
            .expect_apply_payment()
            .times(1)
            .returning(|_| Ok(()));

        usecase(repository, mail, applier)
            .ingest(&batch_body("m1"))
            .await;
    }

    #[test]
    fn applied_at_parses_the_bank_date_format() {
        let parsed = parse_applied_at("15/03/2024 13:45:12").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-15T13:45:12+00:00");

        assert!(parse_applied_at("not a date").is_none());
    }
}
