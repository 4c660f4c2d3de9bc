//! Keeps the search index in step with the entity store.
//!
//! Index writes are attempted inline right after the entity store commits. A
//! failed write is parked in the [`IndexOutbox`] and retried by the reconciler,
//! which re-reads the canonical record from the entity store instead of replaying
//! the payload captured at failure time, so a retry always converges on the latest state.
//! A successful inline write never clears pending entries: a concurrent request may
//! have recorded a newer failure for the same id.

use crate::{ApplicationError, AuthorRepository, AuthorSearchRepository};
use domain::{Author, AuthorId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// A write that should be mirrored into the search index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOperation {
    Upsert(Author),
    Delete(AuthorId),
}

impl IndexOperation {
    fn kind(&self) -> &'static str {
        match self {
            IndexOperation::Upsert(_) => "upsert",
            IndexOperation::Delete(_) => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time between reconciliation passes.
    pub interval: Duration,
    /// Attempts (including the inline one) before a pending write is dropped.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// An index write that failed and awaits retry.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingIndexOperation {
    pub id: AuthorId,
    pub operation: IndexOperation,
    pub attempts: u32,
    pub last_error: String,
    sequence: u64,
}

#[derive(Debug, Default)]
struct OutboxState {
    pending: BTreeMap<AuthorId, PendingIndexOperation>,
    next_sequence: u64,
}

enum RetryOutcome {
    Retrying(u32),
    GaveUp,
    Superseded,
}

/// Pending index writes, at most one per author id (the latest wins).
#[derive(Debug, Default)]
pub struct IndexOutbox {
    state: Mutex<OutboxState>,
}

impl IndexOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed index write, replacing any older pending write for the same id.
    pub async fn record(&self, id: AuthorId, operation: IndexOperation, error: &ApplicationError) {
        let mut state = self.state.lock().await;
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.pending.insert(
            id,
            PendingIndexOperation {
                id,
                operation,
                attempts: 1,
                last_error: error.to_string(),
                sequence,
            },
        );
    }

    pub async fn snapshot(&self) -> Vec<PendingIndexOperation> {
        self.state.lock().await.pending.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }

    /// Removes `entry` unless it was replaced after the snapshot was taken.
    async fn complete(&self, entry: &PendingIndexOperation) -> bool {
        let mut state = self.state.lock().await;
        let is_current = state
            .pending
            .get(&entry.id)
            .is_some_and(|current| current.sequence == entry.sequence);
        if is_current {
            state.pending.remove(&entry.id);
        }
        is_current
    }

    async fn fail(
        &self,
        entry: &PendingIndexOperation,
        error: &ApplicationError,
        max_attempts: u32,
    ) -> RetryOutcome {
        let mut state = self.state.lock().await;
        let attempts = match state.pending.get_mut(&entry.id) {
            Some(current) if current.sequence == entry.sequence => {
                current.attempts += 1;
                current.last_error = error.to_string();
                current.attempts
            }
            _ => return RetryOutcome::Superseded,
        };
        if attempts >= max_attempts {
            state.pending.remove(&entry.id);
            RetryOutcome::GaveUp
        } else {
            RetryOutcome::Retrying(attempts)
        }
    }
}

/// Counts from one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dropped: usize,
}

/// Mirrors entity store writes into the search index, parking failures in the outbox.
pub struct IndexSynchronizer {
    author_repo: Arc<dyn AuthorRepository>,
    search_repo: Arc<dyn AuthorSearchRepository>,
    outbox: Arc<IndexOutbox>,
    policy: RetryPolicy,
}

impl IndexSynchronizer {
    pub fn new(
        author_repo: Arc<dyn AuthorRepository>,
        search_repo: Arc<dyn AuthorSearchRepository>,
        outbox: Arc<IndexOutbox>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            author_repo,
            search_repo,
            outbox,
            policy,
        }
    }

    /// Applies `operation` to the index. Never fails: errors go to the outbox.
    #[instrument(skip(self, id, operation), fields(author_id = %id, op = operation.kind()))]
    pub async fn apply(&self, id: AuthorId, operation: IndexOperation) {
        let result = match &operation {
            IndexOperation::Upsert(author) => self.search_repo.save(author).await,
            IndexOperation::Delete(target) => self.search_repo.delete(*target).await,
        };

        if let Err(e) = result {
            warn!("Index write failed, queued for retry: {}", e);
            self.outbox.record(id, operation, &e).await;
        }
    }

    /// Retries every pending write once.
    #[instrument(skip(self))]
    pub async fn retry_pending(&self) -> ReconcileReport {
        let pending = self.outbox.snapshot().await;
        let mut report = ReconcileReport::default();

        for entry in pending {
            report.attempted += 1;
            match self.resolve(entry.id).await {
                Ok(()) => {
                    if self.outbox.complete(&entry).await {
                        info!(author_id = %entry.id, "Pending index write reconciled");
                    }
                    report.succeeded += 1;
                }
                Err(e) => match self.outbox.fail(&entry, &e, self.policy.max_attempts).await {
                    RetryOutcome::Retrying(attempts) => {
                        warn!(author_id = %entry.id, attempts, "Index reconciliation failed: {}", e);
                        report.failed += 1;
                    }
                    RetryOutcome::GaveUp => {
                        error!(
                            author_id = %entry.id,
                            op = entry.operation.kind(),
                            "Giving up on index write after {} attempts: {}",
                            self.policy.max_attempts,
                            e
                        );
                        report.dropped += 1;
                    }
                    RetryOutcome::Superseded => {
                        debug!(author_id = %entry.id, "Pending index write replaced during retry");
                        report.failed += 1;
                    }
                },
            }
        }
        report
    }

    /// Brings the index entry for `id` in line with the entity store.
    async fn resolve(&self, id: AuthorId) -> Result<(), ApplicationError> {
        match self.author_repo.find_one(id).await? {
            Some(author) => self.search_repo.save(&author).await,
            None => self.search_repo.delete(id).await,
        }
    }

    /// Spawns the background task that drains the outbox every `policy.interval`.
    pub fn spawn_reconciler(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.policy.interval.max(Duration::from_millis(1));
        info!(interval_ms = period.as_millis() as u64, "Starting index reconciler");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.outbox.is_empty().await {
                    continue;
                }
                let report = self.retry_pending().await;
                debug!(?report, "Index reconciliation pass finished");
            }
        })
    }
}
