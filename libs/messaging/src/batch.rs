//! Priority-bucketed batching with size-or-interval flushing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use strand_codec::EnvelopeCodec;
use strand_types::{kind, BatchPayload, Envelope, Metadata, MessagePayload, Priority};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::Channel;
use crate::metrics::MessengerCounters;
use crate::MessengerResult;

/// A full batch flushes immediately, without waiting for the timer.
pub const MAX_BATCH_SIZE: usize = 10;

/// The periodic flush interval. Every non-empty open batch flushes on the
/// tick regardless of size.
pub const BATCH_INTERVAL_MS: u64 = 100;

/// Type-tag heuristic for batch eligibility: bulk update/recalculation
/// traffic batches, everything else sends immediately.
pub fn is_batchable_kind(kind_tag: &str) -> bool {
    kind_tag.ends_with("_UPDATE") || kind_tag.ends_with("_CALCULATED")
}

#[derive(Debug)]
struct OpenBatch {
    batch_id: String,
    envelopes: Vec<Envelope>,
}

impl OpenBatch {
    fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            envelopes: Vec::with_capacity(MAX_BATCH_SIZE),
        }
    }
}

/// Groups outgoing envelopes by priority and flushes each bucket when it
/// reaches [`MAX_BATCH_SIZE`] or the interval timer fires, whichever
/// comes first. A batch never mixes priorities.
#[derive(Debug)]
pub struct BatchManager {
    channel: Arc<dyn Channel>,
    codec: EnvelopeCodec,
    counters: Arc<MessengerCounters>,
    source_domain: String,
    target_domain: String,
    buckets: Mutex<HashMap<Priority, OpenBatch>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchManager {
    pub fn new(
        channel: Arc<dyn Channel>,
        codec: EnvelopeCodec,
        counters: Arc<MessengerCounters>,
        source_domain: impl Into<String>,
        target_domain: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel,
            codec,
            counters,
            source_domain: source_domain.into(),
            target_domain: target_domain.into(),
            buckets: Mutex::new(HashMap::new()),
            flush_task: Mutex::new(None),
        })
    }

    /// Start the periodic flush task. Must be called from within a tokio
    /// runtime; calling twice replaces the previous task.
    pub fn start(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(BATCH_INTERVAL_MS));
            // The first tick completes immediately; skip it so an empty
            // manager does not flush at startup.
            interval.tick().await;
            loop {
                interval.tick().await;
                manager.flush_all().await;
            }
        });

        if let Some(previous) = self.flush_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Append an envelope to the open batch for its priority, flushing the
    /// bucket if it just filled. Submission order is preserved within the
    /// bucket.
    pub async fn submit(&self, mut envelope: Envelope) -> MessengerResult<()> {
        let full_bucket = {
            let mut buckets = self.buckets.lock();
            let bucket = buckets
                .entry(envelope.metadata.priority)
                .or_insert_with(OpenBatch::new);
            envelope.metadata.batch_id = Some(bucket.batch_id.clone());
            let priority = envelope.metadata.priority;
            bucket.envelopes.push(envelope);
            if bucket.envelopes.len() >= MAX_BATCH_SIZE {
                buckets.remove(&priority)
            } else {
                None
            }
        };

        if let Some(batch) = full_bucket {
            self.flush(batch).await?;
        }
        Ok(())
    }

    /// Flush every non-empty open batch, clearing the open-batch set.
    /// Timer-driven failures are logged and counted; there is no caller to
    /// surface them to.
    pub async fn flush_all(&self) {
        let drained: Vec<OpenBatch> = {
            let mut buckets = self.buckets.lock();
            Priority::ALL
                .iter()
                .filter_map(|priority| buckets.remove(priority))
                .collect()
        };

        for batch in drained {
            if let Err(error) = self.flush(batch).await {
                debug!(%error, "interval flush failed");
            }
        }
    }

    /// Serialize a batch as one `BATCH_MESSAGE` envelope and transmit it.
    async fn flush(&self, batch: OpenBatch) -> MessengerResult<()> {
        let count = batch.envelopes.len() as u64;
        let priority = batch
            .envelopes
            .first()
            .map(|e| e.metadata.priority)
            .unwrap_or_default();

        let (envelope, individual_bytes) = self.seal(batch.batch_id, batch.envelopes, priority);
        let (wire, _) = self.codec.encode(&envelope, false)?;
        let ratio = individual_bytes as f64 / wire.len() as f64;

        match self.channel.transmit(wire).await {
            Ok(()) => {
                self.counters.record_batch_flush(count, ratio);
                Ok(())
            }
            Err(error) => {
                self.counters.record_error();
                warn!(%error, messages = count, "batch transmit failed; not retried");
                Err(error.into())
            }
        }
    }

    /// Build the `BATCH_MESSAGE` envelope wrapping `envelopes`.
    fn seal(
        &self,
        batch_id: String,
        envelopes: Vec<Envelope>,
        priority: Priority,
    ) -> (Envelope, u64) {
        let individual_bytes: u64 = envelopes.iter().map(individual_size_of).sum();

        let metadata = Metadata::mint(&self.source_domain, &self.target_domain)
            .with_priority(priority)
            .with_batch_id(batch_id.clone());

        let payload = MessagePayload::Batch(BatchPayload {
            batch_id,
            messages: envelopes,
            total_size_bytes: individual_bytes,
            // Recomputed against the actual wire size by the flush path.
            compression_ratio: 0.0,
            priority,
        });

        (
            Envelope::new(kind::BATCH_MESSAGE, metadata, payload),
            individual_bytes,
        )
    }

    /// Caller-driven batch construction for the explicit bulk path:
    /// wraps pre-built envelopes and transmits immediately, bypassing the
    /// timer. Returns the batch id and message count.
    pub async fn send_explicit(
        &self,
        mut envelopes: Vec<Envelope>,
        priority: Priority,
    ) -> MessengerResult<(String, u64)> {
        let batch_id = Uuid::new_v4().to_string();
        let count = envelopes.len() as u64;
        for envelope in &mut envelopes {
            envelope.metadata.batch_id = Some(batch_id.clone());
        }

        let (envelope, individual_bytes) = self.seal(batch_id.clone(), envelopes, priority);
        let (wire, _) = self.codec.encode(&envelope, false)?;
        let ratio = individual_bytes as f64 / wire.len() as f64;

        match self.channel.transmit(wire).await {
            Ok(()) => {
                self.counters.record_batch_flush(count, ratio);
                Ok((batch_id, count))
            }
            Err(error) => {
                self.counters.record_error();
                warn!(%error, messages = count, "explicit batch transmit failed");
                Err(error.into())
            }
        }
    }

    /// Number of envelopes waiting in open batches.
    pub fn pending(&self) -> usize {
        self.buckets
            .lock()
            .values()
            .map(|bucket| bucket.envelopes.len())
            .sum()
    }

    /// Stop the periodic flush and drop open batches. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self.flush_task.lock().take() {
            handle.abort();
        }
        self.buckets.lock().clear();
    }
}

fn individual_size_of(envelope: &Envelope) -> u64 {
    envelope.to_wire_value().to_string().len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryChannel;
    use strand_types::{BalanceUpdated, SettlementUpdate};

    fn settlement(priority: Priority) -> Envelope {
        Envelope::new(
            kind::SETTLEMENT_UPDATE,
            Metadata::mint("settlement", "dashboard").with_priority(priority),
            MessagePayload::SettlementUpdate(SettlementUpdate {
                settlement_id: "PEN_001".to_string(),
                amount: 166.67,
                currency: None,
                status: None,
            }),
        )
    }

    fn manager_with_channel() -> (Arc<BatchManager>, Arc<InMemoryChannel>) {
        let channel = Arc::new(InMemoryChannel::new());
        let manager = BatchManager::new(
            channel.clone(),
            EnvelopeCodec::default(),
            Arc::new(MessengerCounters::new()),
            "settlement",
            "dashboard",
        );
        (manager, channel)
    }

    #[test]
    fn test_batchable_kind_heuristic() {
        assert!(is_batchable_kind("SETTLEMENT_UPDATE"));
        assert!(is_batchable_kind("COMMISSION_CALCULATED"));
        assert!(!is_batchable_kind("BONUS_AWARDED"));
        assert!(!is_batchable_kind("PING"));
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_exactly_once() {
        let (manager, channel) = manager_with_channel();

        for _ in 0..MAX_BATCH_SIZE {
            manager.submit(settlement(Priority::Normal)).await.unwrap();
        }

        assert_eq!(channel.wire_count(), 1);
        assert_eq!(manager.pending(), 0);

        let decoded = EnvelopeCodec::default()
            .decode(&channel.sent_wires()[0])
            .unwrap();
        assert_eq!(decoded.kind, kind::BATCH_MESSAGE);
        match decoded.payload {
            MessagePayload::Batch(batch) => {
                assert_eq!(batch.messages.len(), MAX_BATCH_SIZE);
                assert_eq!(batch.priority, Priority::Normal);
                // Every member carries the batch id.
                for message in &batch.messages {
                    assert_eq!(message.metadata.batch_id.as_deref(), Some(batch.batch_id.as_str()));
                }
            }
            other => panic!("expected batch payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_priorities_never_share_a_batch() {
        let (manager, channel) = manager_with_channel();

        for _ in 0..MAX_BATCH_SIZE - 1 {
            manager.submit(settlement(Priority::Normal)).await.unwrap();
            manager.submit(settlement(Priority::High)).await.unwrap();
        }
        // Neither bucket is full yet.
        assert_eq!(channel.wire_count(), 0);
        assert_eq!(manager.pending(), 2 * (MAX_BATCH_SIZE - 1));

        manager.submit(settlement(Priority::High)).await.unwrap();
        assert_eq!(channel.wire_count(), 1);
        assert_eq!(manager.pending(), MAX_BATCH_SIZE - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_flushes_partial_batches() {
        let (manager, channel) = manager_with_channel();
        manager.start();

        manager.submit(settlement(Priority::Normal)).await.unwrap();
        manager.submit(settlement(Priority::Low)).await.unwrap();
        assert_eq!(channel.wire_count(), 0);

        tokio::time::sleep(Duration::from_millis(BATCH_INTERVAL_MS + 20)).await;

        assert_eq!(channel.wire_count(), 2);
        assert_eq!(manager.pending(), 0);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_submission_order_preserved_within_batch() {
        let (manager, channel) = manager_with_channel();

        let mut expected_ids = Vec::new();
        for i in 0..MAX_BATCH_SIZE {
            let envelope = Envelope::new(
                kind::BALANCE_UPDATED,
                Metadata::mint("settlement", "dashboard"),
                MessagePayload::BalanceUpdated(BalanceUpdated {
                    account_id: format!("ACC_{i}"),
                    balance: i as f64,
                }),
            );
            expected_ids.push(envelope.correlation_id().to_string());
            manager.submit(envelope).await.unwrap();
        }

        let decoded = EnvelopeCodec::default()
            .decode(&channel.sent_wires()[0])
            .unwrap();
        match decoded.payload {
            MessagePayload::Batch(batch) => {
                let ids: Vec<_> = batch
                    .messages
                    .iter()
                    .map(|m| m.correlation_id().to_string())
                    .collect();
                assert_eq!(ids, expected_ids);
            }
            other => panic!("expected batch payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_flush_counts_error_and_does_not_retry() {
        let channel = Arc::new(InMemoryChannel::new());
        let counters = Arc::new(MessengerCounters::new());
        let manager = BatchManager::new(
            channel.clone(),
            EnvelopeCodec::default(),
            counters.clone(),
            "settlement",
            "dashboard",
        );

        channel.fail_next_transmit();
        for _ in 0..MAX_BATCH_SIZE - 1 {
            manager.submit(settlement(Priority::Normal)).await.unwrap();
        }
        let result = manager.submit(settlement(Priority::Normal)).await;
        assert!(result.is_err());
        assert_eq!(counters.snapshot().errors, 1);
        assert_eq!(channel.wire_count(), 0);

        // The failed batch is gone; nothing is retried.
        assert_eq!(manager.pending(), 0);
    }

    #[tokio::test]
    async fn test_explicit_batch_bypasses_buckets() {
        let (manager, channel) = manager_with_channel();

        let envelopes = vec![settlement(Priority::High), settlement(Priority::High)];
        let (batch_id, count) = manager
            .send_explicit(envelopes, Priority::High)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(!batch_id.is_empty());
        assert_eq!(channel.wire_count(), 1);
        assert_eq!(manager.pending(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (manager, _channel) = manager_with_channel();
        manager.start();
        manager.submit(settlement(Priority::Normal)).await.unwrap();

        manager.shutdown();
        assert_eq!(manager.pending(), 0);
        manager.shutdown();
    }
}
