use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::domain::{Certificate, CorrelationInfo, MonthlyIncomeEvent, PersonalNumber};
use crate::eventlog::EventLog;

/// Grant notification payload: the new certificate plus the caller's
/// correlation metadata, passed through unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedNotice {
    pub certificate: Certificate,
    pub correlation: CorrelationInfo,
}

/// Lifecycle notifications delivered to downstream collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A certificate was issued.
    Granted(GrantedNotice),
    /// A certificate was revoked; carries the final snapshot of the deleted
    /// record.
    Revoked(Certificate),
    /// Income was reported for a person the monitor believes has no
    /// certificate. An anomaly signal, not an error.
    InvalidReported(MonthlyIncomeEvent),
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Granted(_) => "certificate_granted",
            LifecycleEvent::Revoked(_) => "certificate_unregistered",
            LifecycleEvent::InvalidReported(_) => "certificate_invalid_reported",
        }
    }

    pub fn personal_number(&self) -> &PersonalNumber {
        match self {
            LifecycleEvent::Granted(notice) => &notice.certificate.personal_number,
            LifecycleEvent::Revoked(certificate) => &certificate.personal_number,
            LifecycleEvent::InvalidReported(event) => &event.personal_number,
        }
    }
}

/// Outcome signal from the remote endpoint.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The listener is not yet bound or transiently unreachable; worth
    /// retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// The endpoint rejected the delivery outright. Not retried.
    #[error("delivery rejected: {0}")]
    Fatal(String),
}

/// Transport boundary for lifecycle notifications. Serialization and the
/// actual wire protocol belong to the implementor.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, endpoint: &str, event: &LifecycleEvent) -> Result<(), SinkError>;
}

/// Named downstream endpoints, one per lifecycle event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEndpoints {
    pub granted: String,
    pub revoked: String,
    pub invalid: String,
}

impl Default for DispatchEndpoints {
    fn default() -> Self {
        Self {
            granted: "certificates/granted".to_string(),
            revoked: "certificates/unregistered".to_string(),
            invalid: "certificates/invalid".to_string(),
        }
    }
}

impl DispatchEndpoints {
    fn for_event(&self, event: &LifecycleEvent) -> &str {
        match event {
            LifecycleEvent::Granted(_) => &self.granted,
            LifecycleEvent::Revoked(_) => &self.revoked,
            LifecycleEvent::InvalidReported(_) => &self.invalid,
        }
    }
}

/// Bounded exponential backoff for transient delivery failures. Once the
/// attempt budget is spent the delivery moves to the dead-letter list for
/// operator inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Tuned for startup races between services in the same cluster.
    pub fn intra_cluster() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        }
    }

    /// Tuned for slower-starting downstream dependents.
    pub fn slow_start() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::intra_cluster()
    }
}

/// A delivery that exhausted its retries or was rejected outright.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub endpoint: String,
    pub reason: String,
    pub attempts: u32,
    pub event: LifecycleEvent,
}

/// Live counters for the dispatch worker.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    retries: AtomicU64,
    dead_lettered: AtomicU64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        let submitted = self.submitted.load(Ordering::Relaxed);
        let delivered = self.delivered.load(Ordering::Relaxed);
        let dead_lettered = self.dead_lettered.load(Ordering::Relaxed);
        DispatchStatsSnapshot {
            submitted,
            delivered,
            retries: self.retries.load(Ordering::Relaxed),
            dead_lettered,
            pending: submitted.saturating_sub(delivered + dead_lettered),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    pub submitted: u64,
    pub delivered: u64,
    pub retries: u64,
    pub dead_lettered: u64,
    pub pending: u64,
}

/// Final accounting produced by the worker once every dispatcher handle has
/// been dropped and the queue is drained.
#[derive(Debug)]
pub struct DispatchReport {
    pub stats: DispatchStatsSnapshot,
    pub dead_letters: Vec<DeadLetter>,
}

struct Delivery {
    endpoint: String,
    event: LifecycleEvent,
}

/// Cloneable handle feeding the supervised dispatch worker. Enqueueing never
/// blocks; callers observe completion through `stats` and `dead_letters`
/// rather than awaiting individual deliveries.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
    endpoints: Arc<DispatchEndpoints>,
    stats: Arc<DispatchStats>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl EventDispatcher {
    /// Start the dispatch worker, returning the handle and the worker task.
    /// The worker drains remaining deliveries and exits once every handle
    /// clone has been dropped.
    pub fn spawn(
        sink: Arc<dyn EventSink>,
        policy: RetryPolicy,
        endpoints: DispatchEndpoints,
        event_log: Option<Arc<EventLog>>,
    ) -> (Self, JoinHandle<DispatchReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(DispatchStats::default());
        let dead_letters = Arc::new(Mutex::new(Vec::new()));

        let worker = DispatchWorker {
            rx,
            sink,
            policy,
            stats: Arc::clone(&stats),
            dead_letters: Arc::clone(&dead_letters),
            event_log,
        };
        let handle = tokio::spawn(worker.run());

        (
            Self {
                tx,
                endpoints: Arc::new(endpoints),
                stats,
                dead_letters,
            },
            handle,
        )
    }

    /// Queue a lifecycle notification for at-least-once delivery. Returns
    /// immediately; the state transition that triggered the event is never
    /// blocked by delivery.
    pub fn dispatch(&self, event: LifecycleEvent) -> Result<(), DispatchError> {
        let endpoint = self.endpoints.for_event(&event).to_string();
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(Delivery { endpoint, event })
            .map_err(|_| DispatchError::WorkerStopped)
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters
            .lock()
            .expect("dead letter mutex poisoned")
            .clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch worker is no longer running")]
    WorkerStopped,
}

struct DispatchWorker {
    rx: mpsc::UnboundedReceiver<Delivery>,
    sink: Arc<dyn EventSink>,
    policy: RetryPolicy,
    stats: Arc<DispatchStats>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    event_log: Option<Arc<EventLog>>,
}

impl DispatchWorker {
    async fn run(mut self) -> DispatchReport {
        while let Some(delivery) = self.rx.recv().await {
            self.deliver(delivery).await;
        }
        DispatchReport {
            stats: self.stats.snapshot(),
            dead_letters: self
                .dead_letters
                .lock()
                .expect("dead letter mutex poisoned")
                .clone(),
        }
    }

    async fn deliver(&self, delivery: Delivery) {
        let mut delay = self.policy.initial_delay;

        for attempt in 1..=self.policy.max_attempts {
            match self.sink.send(&delivery.endpoint, &delivery.event).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    info!(
                        kind = delivery.event.kind(),
                        endpoint = %delivery.endpoint,
                        personal_number = %delivery.event.personal_number(),
                        attempt,
                        "lifecycle event delivered"
                    );
                    self.audit(&delivery);
                    return;
                }
                Err(SinkError::Transient(reason)) => {
                    warn!(
                        kind = delivery.event.kind(),
                        endpoint = %delivery.endpoint,
                        attempt,
                        %reason,
                        "transient delivery failure, backing off"
                    );
                    if attempt == self.policy.max_attempts {
                        break;
                    }
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.policy.max_delay);
                }
                Err(SinkError::Fatal(reason)) => {
                    error!(
                        kind = delivery.event.kind(),
                        endpoint = %delivery.endpoint,
                        attempt,
                        %reason,
                        "delivery rejected"
                    );
                    self.dead_letter(delivery, attempt, reason);
                    return;
                }
            }
        }

        let attempts = self.policy.max_attempts;
        self.dead_letter(delivery, attempts, "retry budget exhausted".to_string());
    }

    fn audit(&self, delivery: &Delivery) {
        if let Some(log) = &self.event_log {
            let description = format!(
                "{} delivered to {} for {}",
                delivery.event.kind(),
                delivery.endpoint,
                delivery.event.personal_number()
            );
            if let Err(err) = log.record(&description) {
                warn!(%err, "event log write failed");
            }
        }
    }

    fn dead_letter(&self, delivery: Delivery, attempts: u32, reason: String) {
        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
        error!(
            kind = delivery.event.kind(),
            endpoint = %delivery.endpoint,
            attempts,
            %reason,
            "delivery dead-lettered"
        );
        self.dead_letters
            .lock()
            .expect("dead letter mutex poisoned")
            .push(DeadLetter {
                endpoint: delivery.endpoint,
                reason,
                attempts,
                event: delivery.event,
            });
    }
}
