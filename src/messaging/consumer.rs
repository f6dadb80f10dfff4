use std::sync::Arc;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::config::KafkaConfig;
use crate::error::OrderError;
use crate::metrics::Metrics;
use crate::model::Order;
use crate::service::OrderCreator;

// ============================================================================
// Kafka Consumer - the ingestion side of the pipeline
// ============================================================================
//
// One message at a time, end to end: fetch -> decode -> validate -> create
// -> commit. Offsets are committed manually, and only for messages that
// must never be redelivered:
//
// - malformed payloads: committed (retrying cannot fix the bytes)
// - validation failures: committed, with the violated fields logged
// - duplicate uids: committed (the aggregate is already durable)
// - any other persistence failure: NOT committed, so the broker redelivers
//   after a rebalance or restart
//
// The requeue decision itself lives in OrderError::is_retryable, so a
// dead-letter or backoff strategy can slot in without touching this loop.
// Cancellation is observed between fetches only; an in-flight message
// always runs to completion.
//
// ============================================================================

/// What the loop should do with the offset of a handled message.
#[derive(Debug)]
pub enum MessageOutcome {
    /// Durably persisted; commit.
    Processed,
    /// Dropped on purpose; commit so it is never redelivered.
    Skipped(SkipReason),
    /// Transient failure; leave uncommitted for redelivery.
    Requeue(OrderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Decode,
    Validation,
    Duplicate,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::Decode => "decode",
            SkipReason::Validation => "validation",
            SkipReason::Duplicate => "duplicate",
        }
    }
}

/// Decode/validate/persist one payload. Kept apart from the rdkafka plumbing
/// so the outcome taxonomy is testable without a broker.
struct MessageHandler {
    service: Arc<dyn OrderCreator>,
    metrics: Arc<Metrics>,
}

impl MessageHandler {
    async fn handle(&self, payload: Option<&[u8]>) -> MessageOutcome {
        let Some(payload) = payload else {
            tracing::warn!("message carries no payload, skipping");
            return MessageOutcome::Skipped(SkipReason::Decode);
        };

        let order: Order = match serde_json::from_slice(payload) {
            Ok(order) => order,
            Err(err) => {
                tracing::warn!(error = %err, "failed to decode message, skipping");
                return MessageOutcome::Skipped(SkipReason::Decode);
            }
        };

        if let Err(violations) = order.validate() {
            tracing::warn!(
                order_uid = %order.order_uid,
                violations = %violations,
                "message failed validation, skipping"
            );
            return MessageOutcome::Skipped(SkipReason::Validation);
        }

        let order_uid = order.order_uid.clone();
        match self.service.create_order(order).await {
            Ok(()) => {
                tracing::info!(order_uid = %order_uid, "order processed");
                MessageOutcome::Processed
            }
            Err(err) if !err.is_retryable() => {
                tracing::warn!(
                    order_uid = %order_uid,
                    error = %err,
                    "order rejected as duplicate, skipping"
                );
                MessageOutcome::Skipped(SkipReason::Duplicate)
            }
            Err(err) => {
                tracing::error!(
                    order_uid = %order_uid,
                    error = %err,
                    "failed to persist order, leaving message for redelivery"
                );
                MessageOutcome::Requeue(err)
            }
        }
    }

    fn record(&self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Processed => self.metrics.messages_processed.inc(),
            MessageOutcome::Skipped(reason) => self.metrics.record_skip(reason.as_str()),
            MessageOutcome::Requeue(_) => self.metrics.messages_requeued.inc(),
        }
    }
}

pub struct OrderConsumer {
    inner: StreamConsumer,
    handler: MessageHandler,
}

impl OrderConsumer {
    pub fn new(
        cfg: &KafkaConfig,
        service: Arc<dyn OrderCreator>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let inner: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.brokers)
            .set("group.id", &cfg.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        inner.subscribe(&[cfg.topic.as_str()])?;

        Ok(Self {
            inner,
            handler: MessageHandler { service, metrics },
        })
    }

    /// Blocking consumption loop; run it on its own task. Returns once the
    /// cancellation token fires, which is only checked between fetches.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!("kafka consumer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, stopping consumer");
                    break;
                }
                fetched = self.inner.recv() => {
                    let message = match fetched {
                        Ok(message) => message,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to fetch message");
                            continue;
                        }
                    };

                    tracing::debug!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "received message"
                    );

                    let outcome = self.handler.handle(message.payload()).await;
                    self.handler.record(&outcome);

                    match outcome {
                        MessageOutcome::Processed | MessageOutcome::Skipped(_) => {
                            if let Err(err) = self.inner.commit_message(&message, CommitMode::Async) {
                                tracing::error!(error = %err, "failed to commit offset");
                            }
                        }
                        MessageOutcome::Requeue(_) => {
                            // Offset stays uncommitted; the broker will hand
                            // the message out again on the next rebalance.
                        }
                    }
                }
            }
        }

        tracing::info!("kafka consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testdata::{sample_order, SAMPLE_ORDER_JSON};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum CreateResult {
        Ok,
        Duplicate,
        StorageDown,
    }

    struct FakeCreator {
        mode: CreateResult,
        calls: AtomicUsize,
    }

    impl FakeCreator {
        fn new(mode: CreateResult) -> Arc<Self> {
            Arc::new(Self { mode, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl OrderCreator for FakeCreator {
        async fn create_order(&self, order: Order) -> Result<(), OrderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                CreateResult::Ok => Ok(()),
                CreateResult::Duplicate => Err(OrderError::Duplicate(order.order_uid)),
                CreateResult::StorageDown => Err(OrderError::Storage(sqlx::Error::PoolClosed)),
            }
        }
    }

    fn handler(service: Arc<FakeCreator>) -> MessageHandler {
        MessageHandler {
            service,
            metrics: Arc::new(Metrics::new().unwrap()),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped_without_a_store_call() {
        let service = FakeCreator::new(CreateResult::Ok);
        let handler = handler(service.clone());

        let outcome = handler.handle(Some(b"{not json")).await;

        assert!(matches!(outcome, MessageOutcome::Skipped(SkipReason::Decode)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_payload_is_skipped() {
        let service = FakeCreator::new(CreateResult::Ok);
        let handler = handler(service.clone());

        let outcome = handler.handle(None).await;

        assert!(matches!(outcome, MessageOutcome::Skipped(SkipReason::Decode)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_item_list_is_skipped_without_a_store_call() {
        let mut order = sample_order();
        order.items.clear();
        let payload = serde_json::to_vec(&order).unwrap();

        let service = FakeCreator::new(CreateResult::Ok);
        let handler = handler(service.clone());

        let outcome = handler.handle(Some(&payload)).await;

        assert!(matches!(outcome, MessageOutcome::Skipped(SkipReason::Validation)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn well_formed_order_is_processed() {
        let service = FakeCreator::new(CreateResult::Ok);
        let handler = handler(service.clone());

        let outcome = handler.handle(Some(SAMPLE_ORDER_JSON.as_bytes())).await;

        assert!(matches!(outcome, MessageOutcome::Processed));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_uid_is_acknowledged_not_requeued() {
        let service = FakeCreator::new(CreateResult::Duplicate);
        let handler = handler(service.clone());

        let outcome = handler.handle(Some(SAMPLE_ORDER_JSON.as_bytes())).await;

        assert!(matches!(outcome, MessageOutcome::Skipped(SkipReason::Duplicate)));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_storage_failure_is_requeued() {
        let service = FakeCreator::new(CreateResult::StorageDown);
        let handler = handler(service.clone());

        let outcome = handler.handle(Some(SAMPLE_ORDER_JSON.as_bytes())).await;

        assert!(matches!(outcome, MessageOutcome::Requeue(OrderError::Storage(_))));
    }

    #[tokio::test]
    async fn outcomes_are_counted() {
        let service = FakeCreator::new(CreateResult::Ok);
        let handler = handler(service);

        let outcome = handler.handle(Some(SAMPLE_ORDER_JSON.as_bytes())).await;
        handler.record(&outcome);
        let outcome = handler.handle(Some(b"garbage")).await;
        handler.record(&outcome);

        assert_eq!(handler.metrics.messages_processed.get(), 1);
        assert_eq!(
            handler.metrics.messages_skipped.with_label_values(&["decode"]).get(),
            1
        );
    }
}
