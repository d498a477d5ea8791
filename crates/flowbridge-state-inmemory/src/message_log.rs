//! Bounded message log
//!
//! Keeps payload captures, processing events and the final outcome of every
//! execution, grouped by correlation id. Entries older than the retention age
//! are evicted by a periodic sweep; when the log is full the least recently
//! updated entry makes room for a new one.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use flowbridge_core::{
    CoreError, CorrelationId, ExecutionRecord, ExecutionRecorder, FlowId, PayloadCapture,
    ProcessingEvent,
};

/// How long and how many entries the log keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Entries not updated for this long are evicted
    pub max_age: Duration,
    /// Maximum number of correlation ids kept
    pub capacity: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(3600),
            capacity: 10_000,
        }
    }
}

/// Everything recorded for one execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLogEntry {
    pub correlation_id: CorrelationId,
    pub payloads: Vec<PayloadCapture>,
    pub events: Vec<ProcessingEvent>,
    pub outcome: Option<ExecutionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageLogEntry {
    fn new(correlation_id: CorrelationId, now: DateTime<Utc>) -> Self {
        Self {
            correlation_id,
            payloads: Vec::new(),
            events: Vec::new(),
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// In-memory [`ExecutionRecorder`]
pub struct InMemoryMessageLog {
    entries: RwLock<HashMap<CorrelationId, MessageLogEntry>>,
    policy: RetentionPolicy,
}

impl InMemoryMessageLog {
    /// Create a log without a background sweep
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Create a log and start sweeping it every `interval`.
    ///
    /// The sweep task holds a weak reference and exits once the log is dropped.
    pub fn start(policy: RetentionPolicy, interval: Duration) -> (Arc<Self>, JoinHandle<()>) {
        let log = Arc::new(Self::new(policy));
        let handle = tokio::spawn(sweep_loop(Arc::downgrade(&log), interval));
        (log, handle)
    }

    /// Retention policy in force
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Entry for one execution
    pub async fn get(&self, correlation_id: &CorrelationId) -> Option<MessageLogEntry> {
        self.entries.read().await.get(correlation_id).cloned()
    }

    /// Entries whose outcome belongs to `flow_id`, most recent first
    pub async fn entries_for_flow(&self, flow_id: &FlowId) -> Vec<MessageLogEntry> {
        let entries = self.entries.read().await;
        let mut matching: Vec<MessageLogEntry> = entries
            .values()
            .filter(|entry| {
                entry
                    .outcome
                    .as_ref()
                    .map_or(false, |outcome| &outcome.flow_id == flow_id)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matching
    }

    /// Number of executions held
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log holds nothing
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Evict entries not updated since `now - max_age`; returns how many were removed
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let max_age = TimeDelta::from_std(self.policy.max_age)
            .unwrap_or_else(|_| TimeDelta::MAX);
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.updated_at >= cutoff);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "Swept message log");
        }
        evicted
    }

    async fn update<F>(&self, correlation_id: &CorrelationId, apply: F)
    where
        F: FnOnce(&mut MessageLogEntry),
    {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        if !entries.contains_key(correlation_id) {
            make_room(&mut entries, self.policy.capacity);
        }
        let entry = entries
            .entry(correlation_id.clone())
            .or_insert_with(|| MessageLogEntry::new(correlation_id.clone(), now));
        apply(entry);
        entry.updated_at = now;
    }
}

fn make_room(entries: &mut HashMap<CorrelationId, MessageLogEntry>, capacity: usize) {
    while !entries.is_empty() && entries.len() >= capacity.max(1) {
        let oldest = entries
            .values()
            .min_by_key(|entry| entry.updated_at)
            .map(|entry| entry.correlation_id.clone());
        match oldest {
            Some(id) => {
                entries.remove(&id);
            }
            None => break,
        }
    }
}

async fn sweep_loop(log: Weak<InMemoryMessageLog>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(log) = log.upgrade() else {
            info!("Message log dropped, stopping sweep");
            return;
        };
        log.sweep(Utc::now()).await;
    }
}

#[async_trait]
impl ExecutionRecorder for InMemoryMessageLog {
    async fn record_payload(&self, capture: PayloadCapture) -> Result<(), CoreError> {
        let id = capture.correlation_id.clone();
        self.update(&id, |entry| entry.payloads.push(capture)).await;
        Ok(())
    }

    async fn record_event(
        &self,
        correlation_id: &CorrelationId,
        event: ProcessingEvent,
    ) -> Result<(), CoreError> {
        self.update(correlation_id, |entry| entry.events.push(event)).await;
        Ok(())
    }

    async fn record_outcome(&self, record: ExecutionRecord) -> Result<(), CoreError> {
        let id = record.correlation_id.clone();
        self.update(&id, |entry| entry.outcome = Some(record)).await;
        Ok(())
    }
}
