use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::{
    application::usecases::notification_ingestion::{
        MailGateway, NotificationIngestionUseCase, PaymentApplier,
    },
    domain::repositories::payment_notifications::PaymentNotificationRepository,
};

/// Handle the webhook endpoint enqueues raw deliveries into. The endpoint
/// must acknowledge within the provider's delivery timeout, so a full queue
/// sheds load (warn and drop) instead of blocking the acknowledgment.
#[derive(Clone)]
pub struct IngestionQueue {
    tx: mpsc::Sender<String>,
}

impl IngestionQueue {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    pub fn enqueue(&self, raw_body: String) {
        match self.tx.try_send(raw_body) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("ingestion queue: queue full, dropping delivery");
            }
            Err(TrySendError::Closed(_)) => {
                error!("ingestion queue: queue closed, dropping delivery");
            }
        }
    }

    #[cfg(test)]
    pub fn sender_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Starts the bounded queue and its worker pool. Workers share one receiver;
/// each takes the next delivery and runs the full ingestion pipeline on it.
pub fn start_ingestion_workers<R, G, A>(
    usecase: Arc<NotificationIngestionUseCase<R, G, A>>,
    capacity: usize,
    workers: usize,
) -> (IngestionQueue, Vec<JoinHandle<()>>)
where
    R: PaymentNotificationRepository + Send + Sync + 'static,
    G: MailGateway + 'static,
    A: PaymentApplier + 'static,
{
    let (tx, rx) = mpsc::channel::<String>(capacity.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let worker_count = workers.max(1);
    let mut handles = Vec::with_capacity(worker_count);

    for worker_id in 0..worker_count {
        let rx = Arc::clone(&rx);
        let usecase = Arc::clone(&usecase);

        handles.push(tokio::spawn(async move {
            info!(worker_id, "ingestion worker: started");
            loop {
                // Hold the receiver lock only while waiting for the next
                // delivery, never across the ingestion itself.
                let next = { rx.lock().await.recv().await };

                match next {
                    Some(raw_body) => usecase.ingest(&raw_body).await,
                    None => {
                        info!(worker_id, "ingestion worker: queue closed, stopping");
                        break;
                    }
                }
            }
        }));
    }

    (IngestionQueue::new(tx), handles)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        application::usecases::notification_ingestion::{MockMailGateway, MockPaymentApplier},
        domain::repositories::payment_notifications::MockPaymentNotificationRepository,
    };

    fn noop_usecase() -> Arc<
        NotificationIngestionUseCase<
            MockPaymentNotificationRepository,
            MockMailGateway,
            MockPaymentApplier,
        >,
    > {
        Arc::new(NotificationIngestionUseCase::new(
            Arc::new(MockPaymentNotificationRepository::new()),
            Arc::new(MockMailGateway::new()),
            Arc::new(MockPaymentApplier::new()),
            "secret-state".to_string(),
            false,
        ))
    }

    #[tokio::test]
    async fn workers_drain_enqueued_deliveries() {
        let (queue, _handles) = start_ingestion_workers(noop_usecase(), 4, 2);

        // Unparseable bodies are logged and dropped by the pipeline; the
        // queue still has to drain them.
        queue.enqueue("not json".to_string());
        queue.enqueue("also not json".to_string());

        for _ in 0..50 {
            if queue.tx.capacity() == 4 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue did not drain");
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        // No workers draining: build the queue by hand.
        let (tx, _rx) = mpsc::channel::<String>(1);
        let queue = IngestionQueue::new(tx);

        queue.enqueue("first".to_string());
        // Must return immediately rather than await capacity.
        queue.enqueue("second, dropped".to_string());

        assert_eq!(queue.tx.capacity(), 0);
    }
}
