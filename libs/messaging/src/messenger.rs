//! The per-domain worker messenger façade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use strand_codec::EnvelopeCodec;
use strand_rollout::{flag_names, EvalContext, FeatureFlagManager};
use strand_types::{
    DomainEvent, Envelope, Metadata, MessagePayload, Priority, DEFAULT_TTL_MS,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::batch::{is_batchable_kind, BatchManager};
use crate::channel::Channel;
use crate::correlation::CorrelationTracker;
use crate::metrics::{HealthReport, MessengerCounters, MessengerMetrics, MetricsSource};
use crate::{MessengerError, MessengerResult};

/// Identity of a messenger instance.
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    pub source_domain: String,
    pub target_domain: String,
    /// Environment name fed into flag evaluation contexts.
    pub environment: String,
}

impl MessengerConfig {
    pub fn new(source_domain: impl Into<String>, target_domain: impl Into<String>) -> Self {
        Self {
            source_domain: source_domain.into(),
            target_domain: target_domain.into(),
            environment: "production".to_string(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }
}

/// Per-send knobs. Defaults: normal priority, no compression, no
/// batching, five-minute TTL.
#[derive(Debug, Clone)]
pub struct SendOptions {
    pub priority: Priority,
    pub compress: bool,
    pub batch: bool,
    pub ttl_ms: u64,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            compress: false,
            batch: false,
            ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

impl SendOptions {
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    pub fn ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }
}

/// Successful result of [`WorkerMessenger::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub correlation_id: String,
    pub latency_ms: f64,
    /// Whether the envelope was queued into an open batch rather than
    /// transmitted immediately.
    pub batched: bool,
}

/// Successful result of [`WorkerMessenger::send_batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReceipt {
    pub batch_id: String,
    pub latency_ms: f64,
    pub message_count: u64,
}

type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// The per-domain façade combining codec, channel, correlation tracker,
/// and batch manager.
///
/// A messenger exclusively owns its tracker and batch queue; the
/// dashboard only ever pulls metric snapshots through [`MetricsSource`].
pub struct WorkerMessenger {
    config: MessengerConfig,
    channel: Arc<dyn Channel>,
    codec: EnvelopeCodec,
    flags: Arc<FeatureFlagManager>,
    tracker: Arc<CorrelationTracker>,
    batcher: Arc<BatchManager>,
    counters: Arc<MessengerCounters>,
    handlers: RwLock<HashMap<String, Handler>>,
    events: broadcast::Sender<DomainEvent>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for WorkerMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerMessenger")
            .field("source_domain", &self.config.source_domain)
            .field("target_domain", &self.config.target_domain)
            .field("destroyed", &self.destroyed.load(Ordering::Relaxed))
            .finish()
    }
}

impl WorkerMessenger {
    /// Build a messenger and start its periodic batch flush. Must be
    /// called from within a tokio runtime.
    pub fn new(
        config: MessengerConfig,
        channel: Arc<dyn Channel>,
        flags: Arc<FeatureFlagManager>,
    ) -> Arc<Self> {
        let codec = EnvelopeCodec::default();
        let counters = Arc::new(MessengerCounters::new());
        let batcher = BatchManager::new(
            Arc::clone(&channel),
            codec.clone(),
            Arc::clone(&counters),
            &config.source_domain,
            &config.target_domain,
        );
        batcher.start();

        let (events, _) = broadcast::channel(128);

        Arc::new(Self {
            config,
            channel,
            codec,
            flags,
            tracker: CorrelationTracker::new(),
            batcher,
            counters,
            handlers: RwLock::new(HashMap::new()),
            events,
            receive_task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Register the handler dispatched for inbound envelopes of `kind`.
    /// Handlers run inline on the receive loop and must not block.
    pub fn register_handler<F>(&self, kind_tag: impl Into<String>, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(kind_tag.into(), Arc::new(handler));
    }

    /// Subscribe to the domain events published by the receive path.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Correlation tracker, for collaborators doing request/response
    /// correlation.
    pub fn tracker(&self) -> &Arc<CorrelationTracker> {
        &self.tracker
    }

    /// Whether the primary transport flag routes this domain onto the
    /// worker transport at all. Callers fall back to the flag's configured
    /// fallback behavior when this samples off.
    pub fn transport_enabled(&self) -> bool {
        self.flags
            .is_enabled(flag_names::WORKER_MESSAGING, Some(&self.eval_context()))
    }

    fn eval_context(&self) -> EvalContext {
        EvalContext::new(&self.config.source_domain, &self.config.environment)
    }

    fn ensure_live(&self) -> MessengerResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(MessengerError::Destroyed(self.config.source_domain.clone()));
        }
        Ok(())
    }

    /// Send one message: mint metadata, track the correlation, then either
    /// queue into a batch or encode and transmit immediately.
    pub async fn send(
        &self,
        kind_tag: &str,
        payload: MessagePayload,
        options: SendOptions,
    ) -> MessengerResult<SendReceipt> {
        self.ensure_live()?;
        let started = Instant::now();
        let ctx = self.eval_context();

        let compress =
            options.compress && self.flags.is_enabled(flag_names::COMPRESSION, Some(&ctx));
        let batched = options.batch
            && is_batchable_kind(kind_tag)
            && self.flags.is_enabled(flag_names::BATCHING, Some(&ctx));

        let metadata = Metadata::mint(&self.config.source_domain, &self.config.target_domain)
            .with_priority(options.priority)
            .with_ttl_ms(options.ttl_ms)
            .with_compression(compress);
        let correlation_id = metadata.correlation_id.clone();
        let envelope = Envelope::new(kind_tag, metadata, payload);

        self.tracker
            .register(correlation_id.clone(), envelope.clone(), options.ttl_ms);

        if batched {
            self.batcher.submit(envelope).await?;
        } else {
            let (wire, ratio) = self.codec.encode(&envelope, compress)?;
            if ratio != 1.0 {
                self.counters.record_compression_ratio(ratio);
            }
            if let Err(error) = self.channel.transmit(wire).await {
                self.counters.record_error();
                return Err(error.into());
            }
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.counters.record_sent(latency_ms);
        Ok(SendReceipt {
            correlation_id,
            latency_ms,
            batched,
        })
    }

    /// Caller-driven bulk send: build one batch from `items` and transmit
    /// it immediately, bypassing the flush timer.
    pub async fn send_batch(
        &self,
        items: Vec<(String, MessagePayload)>,
        priority: Priority,
    ) -> MessengerResult<BatchReceipt> {
        self.ensure_live()?;
        let started = Instant::now();

        let envelopes: Vec<Envelope> = items
            .into_iter()
            .map(|(kind_tag, payload)| {
                let metadata =
                    Metadata::mint(&self.config.source_domain, &self.config.target_domain)
                        .with_priority(priority);
                Envelope::new(kind_tag, metadata, payload)
            })
            .collect();

        let (batch_id, message_count) = self.batcher.send_explicit(envelopes, priority).await?;

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.counters.record_sent_many(message_count, latency_ms);
        Ok(BatchReceipt {
            batch_id,
            latency_ms,
            message_count,
        })
    }

    /// Consume inbound wires from `rx` until the channel closes or the
    /// messenger is destroyed. Registered once per channel.
    pub fn spawn_receive_loop(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<String>) {
        let messenger = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(wire) = rx.recv().await {
                messenger.ingest(&wire);
            }
        });
        if let Some(previous) = self.receive_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Decode and dispatch one inbound wire. Decode failures are contained
    /// here: logged, counted, never fatal to the messenger.
    pub fn ingest(&self, wire: &str) {
        match self.codec.decode(wire) {
            Ok(envelope) => self.dispatch(envelope),
            Err(error) => {
                self.counters.record_error();
                warn!(domain = %self.config.source_domain, %error,
                    "dropping malformed inbound message");
            }
        }
    }

    fn dispatch(&self, envelope: Envelope) {
        match envelope.payload {
            MessagePayload::Batch(batch) => {
                // Unpack and dispatch members in batch order.
                for message in batch.messages {
                    self.dispatch(message);
                }
            }
            _ => self.dispatch_single(envelope),
        }
    }

    fn dispatch_single(&self, envelope: Envelope) {
        let handler = self.handlers.read().get(&envelope.kind).cloned();
        let Some(handler) = handler else {
            warn!(kind = %envelope.kind, "unknown inbound message type; dropped");
            return;
        };

        handler(&envelope);

        self.counters
            .record_received(receive_latency_ms(&envelope.metadata.timestamp));

        self.publish(DomainEvent::WorkerMessageProcessed {
            kind: envelope.kind.clone(),
            correlation_id: envelope.metadata.correlation_id.clone(),
            source_domain: envelope.metadata.source_domain.clone(),
        });
        if let Some(event) = DomainEvent::for_envelope(&envelope) {
            self.publish(event);
        }
    }

    fn publish(&self, event: DomainEvent) {
        // No subscribers is fine; events are best-effort.
        let _ = self.events.send(event);
    }

    /// Point-in-time metric snapshot. Never mutates state.
    pub fn metrics(&self) -> MessengerMetrics {
        self.counters.snapshot()
    }

    /// Fixed-threshold health classification of the current snapshot.
    pub fn health_check(&self) -> HealthReport {
        self.metrics().health()
    }

    /// Cancel the flush timer and receive loop and clear all queues and
    /// maps. Idempotent; safe to call multiple times.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.receive_task.lock().take() {
            handle.abort();
        }
        self.batcher.shutdown();
        self.tracker.clear();
        info!(domain = %self.config.source_domain, "messenger destroyed");
    }
}

impl MetricsSource for WorkerMessenger {
    fn domain(&self) -> &str {
        &self.config.source_domain
    }

    fn metrics(&self) -> MessengerMetrics {
        self.counters.snapshot()
    }
}

/// Age of an inbound envelope based on its creation timestamp; zero when
/// the timestamp does not parse or sits in the future.
fn receive_latency_ms(timestamp: &str) -> f64 {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|ts| (Utc::now() - ts.with_timezone(&Utc)).num_milliseconds().max(0) as f64)
        .unwrap_or(0.0)
}
