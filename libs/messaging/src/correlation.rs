//! TTL-bounded tracking of in-flight correlation ids.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use strand_types::Envelope;
use tracing::trace;

/// A pending envelope awaiting resolution or expiry.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub envelope: Envelope,
    pub registered_at: Instant,
}

/// Maps in-flight correlation ids to pending envelopes.
///
/// Expiry is best-effort: each registration schedules a removal task after
/// the TTL, and a task firing after the entry was already resolved is a
/// no-op. Memory stays bounded by the number of unresolved sends inside
/// their TTL window.
#[derive(Debug, Default)]
pub struct CorrelationTracker {
    entries: DashMap<String, PendingEntry>,
}

impl CorrelationTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a pending envelope and schedule its expiry after `ttl_ms`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(self: &Arc<Self>, correlation_id: String, envelope: Envelope, ttl_ms: u64) {
        self.entries.insert(
            correlation_id.clone(),
            PendingEntry {
                envelope,
                registered_at: Instant::now(),
            },
        );

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ttl_ms)).await;
            if tracker.entries.remove(&correlation_id).is_some() {
                trace!(correlation_id, "correlation entry expired");
            }
        });
    }

    /// Look up and remove a pending entry, if still tracked.
    pub fn resolve(&self, correlation_id: &str) -> Option<Envelope> {
        self.entries
            .remove(correlation_id)
            .map(|(_, entry)| entry.envelope)
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.entries.contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending entry. Scheduled expiries become no-ops.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::{kind, Metadata, MessagePayload, SettlementUpdate};

    fn envelope() -> Envelope {
        Envelope::new(
            kind::SETTLEMENT_UPDATE,
            Metadata::mint("settlement", "dashboard"),
            MessagePayload::SettlementUpdate(SettlementUpdate {
                settlement_id: "PEN_001".to_string(),
                amount: 166.67,
                currency: None,
                status: None,
            }),
        )
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let tracker = CorrelationTracker::new();
        let envelope = envelope();
        let id = envelope.correlation_id().to_string();

        tracker.register(id.clone(), envelope.clone(), 60_000);
        assert!(tracker.contains(&id));
        assert_eq!(tracker.len(), 1);

        let resolved = tracker.resolve(&id).unwrap();
        assert_eq!(resolved, envelope);
        assert!(!tracker.contains(&id));

        // Second resolve finds nothing.
        assert!(tracker.resolve(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_removes_entry() {
        let tracker = CorrelationTracker::new();
        let envelope = envelope();
        let id = envelope.correlation_id().to_string();

        tracker.register(id.clone(), envelope, 50);
        assert!(tracker.contains(&id));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!tracker.contains(&id));
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_after_resolve_is_noop() {
        let tracker = CorrelationTracker::new();
        let envelope = envelope();
        let id = envelope.correlation_id().to_string();

        tracker.register(id.clone(), envelope, 50);
        assert!(tracker.resolve(&id).is_some());

        // The expiry task fires against an already-removed entry.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let tracker = CorrelationTracker::new();
        for _ in 0..3 {
            let envelope = envelope();
            let id = envelope.correlation_id().to_string();
            tracker.register(id, envelope, 60_000);
        }
        assert_eq!(tracker.len(), 3);

        tracker.clear();
        assert!(tracker.is_empty());
    }
}
