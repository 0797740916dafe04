//! Bounded batch execution of reconciliation decisions
//!
//! This module provides the `BatchExecutor`, which applies a run's planned
//! records to the store in sequential chunks.
//!
//! # Design
//!
//! - Chunks of `batch_size` records are applied one after another; the chunk
//!   boundary is a barrier, so a chunk only starts once every operation of the
//!   previous chunk has finished.
//! - Within a chunk at most `max_in_flight` store operations are outstanding at
//!   once (`buffer_unordered`).
//! - A failing record is captured in the outcome and never aborts its chunk or
//!   the run. Completed chunks are not rolled back.
//! - Cancellation is cooperative and checked between chunks. Creates and updates
//!   that were not reached are reported as skipped.
//! - Audit entries are written by detached tasks. Their handles are drained
//!   before the run returns so logging completes, but an audit failure never
//!   changes a record's outcome.
//!
//! # Architecture
//!
//! ```text
//! BatchExecutor
//!     ├── Arc<dyn EntityStore>   (writes)
//!     ├── Arc<dyn AuditSink>     (best-effort audit trail)
//!     ├── ExecutorConfig         (batch_size, max_in_flight)
//!     └── CancellationToken      (checked between chunks)
//! ```

use crate::core::progress::ProgressTracker;
use crate::core::reconciler::PlannedRecord;
use crate::core::traits::{AuditSink, EntityStore};
use crate::types::policy::DEFAULT_BATCH_SIZE;
use crate::types::{
    AuditAction, AuditEntry, EntityId, EntityType, FieldMap, ImportError, ImportOutcome,
    ImportPolicy, ReconciliationDecision, StoreError, StoredEntity,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reason reported for records a cancelled run never reached
pub const CANCELLED_REASON: &str = "run cancelled";

/// Configuration for chunked execution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Number of records per chunk
    pub batch_size: usize,
    /// Maximum number of store operations outstanding within a chunk
    pub max_in_flight: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ExecutorConfig {
    /// Create a new ExecutorConfig, replacing zero values with defaults
    pub fn new(batch_size: usize, max_in_flight: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size, default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_in_flight = if max_in_flight == 0 {
            warn!(
                "Invalid max_in_flight ({}), using batch size ({})",
                max_in_flight, batch_size
            );
            batch_size
        } else {
            max_in_flight
        };

        Self {
            batch_size,
            max_in_flight,
        }
    }

    pub fn from_policy(policy: &ImportPolicy) -> Self {
        Self::new(policy.batch_size, policy.in_flight())
    }
}

/// Identity of the run being executed
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub actor: String,
    pub entity_type: EntityType,
}

/// What happened to one record
#[derive(Debug)]
enum Applied {
    Imported { id: EntityId, fields: FieldMap },
    Updated { id: EntityId, fields: FieldMap },
    Skipped { reason: String, existing_id: Option<EntityId> },
    Failed { error: ImportError },
}

#[derive(Clone)]
pub struct BatchExecutor {
    store: Arc<dyn EntityStore>,
    audit: Arc<dyn AuditSink>,
    config: ExecutorConfig,
    cancel: CancellationToken,
}

impl BatchExecutor {
    pub fn new(
        store: Arc<dyn EntityStore>,
        audit: Arc<dyn AuditSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            audit,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Apply planned records and `replace_all` deletions
    ///
    /// Deletions run first, as their own chunk. The returned outcome is finished:
    /// lists are ordered by position and the summary is filled in.
    pub async fn execute(
        &self,
        ctx: &RunContext,
        records: Vec<PlannedRecord>,
        deletions: Vec<StoredEntity>,
        mut outcome: ImportOutcome,
        progress: &ProgressTracker,
    ) -> ImportOutcome {
        let mut audit_tasks = vec![self.spawn_audit(AuditEntry::new(
            ctx.run_id,
            &ctx.actor,
            ctx.entity_type,
            AuditAction::RunStarted,
            format!("{} records, {} deletions", records.len(), deletions.len()),
        ))];

        if !deletions.is_empty() && !self.cancel.is_cancelled() {
            info!(count = deletions.len(), "Deleting entities missing from the input");
            let results: Vec<_> = stream::iter(deletions)
                .map(|entity| self.delete(ctx, entity))
                .buffer_unordered(self.config.max_in_flight)
                .collect()
                .await;

            for (id, result) in results {
                match result {
                    Ok(task) => {
                        outcome.record_deleted();
                        audit_tasks.push(task);
                    }
                    Err(error) => {
                        warn!(entity_id = %id, error = %error, "Deletion failed");
                        outcome.record_deletion_failure(id, error.to_string());
                    }
                }
            }
        } else if !deletions.is_empty() {
            outcome.cancelled = true;
        }

        let mut remaining = records.into_iter().peekable();
        let mut chunk_index = 0usize;
        while remaining.peek().is_some() {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                let unreached: Vec<PlannedRecord> = remaining.by_ref().collect();
                info!(unreached = unreached.len(), "Run cancelled, skipping remaining records");
                for planned in unreached {
                    self.record_unreached(planned, &mut outcome, progress);
                }
                break;
            }

            let chunk: Vec<PlannedRecord> =
                remaining.by_ref().take(self.config.batch_size).collect();
            chunk_index += 1;
            debug!(chunk = chunk_index, size = chunk.len(), "Applying chunk");

            let applied: Vec<_> = stream::iter(chunk)
                .map(|planned| self.apply(ctx, planned))
                .buffer_unordered(self.config.max_in_flight)
                .collect()
                .await;

            for (planned, result, task) in applied {
                audit_tasks.extend(task);
                self.record(planned, result, &mut outcome, progress);
            }
        }

        for task in futures::future::join_all(audit_tasks).await {
            if let Err(e) = task {
                warn!(error = %e, "Audit task did not complete");
            }
        }

        let outcome = outcome.finish(None);
        let status = outcome.status();
        let summary = &outcome.summary;
        let completed = AuditEntry::new(
            ctx.run_id,
            &ctx.actor,
            ctx.entity_type,
            AuditAction::RunCompleted(status),
            format!(
                "{} imported, {} updated, {} skipped, {} failed, {} deleted",
                summary.imported, summary.updated, summary.skipped, summary.failed, summary.deleted
            ),
        );
        if let Err(e) = self.audit.append(completed).await {
            warn!(error = %e, "Failed to write audit entry");
        }

        outcome
    }

    async fn delete(
        &self,
        ctx: &RunContext,
        entity: StoredEntity,
    ) -> (EntityId, Result<JoinHandle<()>, StoreError>) {
        let result = match self.store.delete(ctx.entity_type, &entity.id).await {
            Ok(()) => Ok(self.spawn_audit(
                AuditEntry::new(
                    ctx.run_id,
                    &ctx.actor,
                    ctx.entity_type,
                    AuditAction::Deleted,
                    "removed by replace_all",
                )
                .for_record(None, &entity.id),
            )),
            Err(e) => Err(e),
        };
        (entity.id, result)
    }

    async fn apply(
        &self,
        ctx: &RunContext,
        planned: PlannedRecord,
    ) -> (PlannedRecord, Applied, Option<JoinHandle<()>>) {
        let position = planned.position;
        let (applied, action, message) = match &planned.decision {
            ReconciliationDecision::Create => {
                match self
                    .store
                    .insert(ctx.entity_type, planned.payload.clone(), &ctx.actor)
                    .await
                {
                    Ok(entity) => (
                        Applied::Imported {
                            id: entity.id,
                            fields: planned.payload.clone(),
                        },
                        AuditAction::Created,
                        "created",
                    ),
                    Err(e) => return self.failed(planned, ImportError::write_failed(position, &e)),
                }
            }
            ReconciliationDecision::Update { target_id } => {
                match self
                    .store
                    .update(ctx.entity_type, target_id, planned.payload.clone())
                    .await
                {
                    Ok(entity) => (
                        Applied::Updated {
                            id: entity.id,
                            fields: planned.payload.clone(),
                        },
                        AuditAction::Updated,
                        "updated",
                    ),
                    Err(e) => return self.failed(planned, ImportError::write_failed(position, &e)),
                }
            }
            ReconciliationDecision::Skip { reason } => {
                let applied = Applied::Skipped {
                    reason: reason.clone(),
                    existing_id: planned.existing.as_ref().map(|e| e.id.clone()),
                };
                return (planned, applied, None);
            }
            ReconciliationDecision::Fail { reason } => {
                let applied = Applied::Failed {
                    error: reason.clone(),
                };
                return (planned, applied, None);
            }
        };

        let entity_id = match &applied {
            Applied::Imported { id, .. } | Applied::Updated { id, .. } => id.clone(),
            _ => String::new(),
        };
        let task = self.spawn_audit(
            AuditEntry::new(ctx.run_id, &ctx.actor, ctx.entity_type, action, message)
                .for_record(Some(position), &entity_id),
        );

        (planned, applied, Some(task))
    }

    fn failed(
        &self,
        planned: PlannedRecord,
        error: ImportError,
    ) -> (PlannedRecord, Applied, Option<JoinHandle<()>>) {
        (planned, Applied::Failed { error }, None)
    }

    fn record(
        &self,
        planned: PlannedRecord,
        applied: Applied,
        outcome: &mut ImportOutcome,
        progress: &ProgressTracker,
    ) {
        let label = planned.label.clone().unwrap_or_default();
        match applied {
            Applied::Imported { id, fields } => {
                debug!(position = planned.position, entity_id = %id, "Created");
                let warnings = planned.warnings;
                outcome.record_imported(planned.position, Some(id), label, fields, warnings);
                progress.record(true);
            }
            Applied::Updated { id, fields } => {
                debug!(position = planned.position, entity_id = %id, "Updated");
                outcome.record_updated(planned.position, id, label, fields, planned.warnings);
                progress.record(true);
            }
            Applied::Skipped { reason, existing_id } => {
                debug!(position = planned.position, reason = %reason, "Skipped");
                outcome.record_skipped(planned.position, planned.label, reason, existing_id);
                progress.record(true);
            }
            Applied::Failed { error } => {
                warn!(position = planned.position, error = %error, "Record failed");
                outcome.record_failed(planned.position, planned.label, planned.input, &error);
                progress.record(false);
            }
        }
    }

    fn record_unreached(
        &self,
        planned: PlannedRecord,
        outcome: &mut ImportOutcome,
        progress: &ProgressTracker,
    ) {
        let applied = match &planned.decision {
            ReconciliationDecision::Fail { reason } => Applied::Failed {
                error: reason.clone(),
            },
            ReconciliationDecision::Skip { reason } => Applied::Skipped {
                reason: reason.clone(),
                existing_id: planned.existing.as_ref().map(|e| e.id.clone()),
            },
            ReconciliationDecision::Create | ReconciliationDecision::Update { .. } => {
                Applied::Skipped {
                    reason: CANCELLED_REASON.to_string(),
                    existing_id: None,
                }
            }
        };
        self.record(planned, applied, outcome, progress);
    }

    fn spawn_audit(&self, entry: AuditEntry) -> JoinHandle<()> {
        let sink = Arc::clone(&self.audit);
        tokio::spawn(async move {
            if let Err(e) = sink.append(entry).await {
                warn!(error = %e, "Failed to write audit entry");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit_log::MemoryAuditSink;
    use crate::core::memory_store::MemoryStore;
    use crate::types::CandidateRecord;
    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn create(position: usize, lesson_id: &str) -> PlannedRecord {
        let candidate = CandidateRecord::new(position, EntityType::Lesson, FieldMap::new());
        PlannedRecord {
            label: Some(lesson_id.to_string()),
            decision: ReconciliationDecision::Create,
            payload: fields(json!({"lesson_id": lesson_id, "title": "T", "skill": "LLMs"})),
            ..PlannedRecord::skipped(&candidate, None, String::new())
        }
    }

    fn ctx() -> RunContext {
        RunContext {
            run_id: Uuid::nil(),
            actor: "admin-1".into(),
            entity_type: EntityType::Lesson,
        }
    }

    /// Store that rejects inserts for one lesson id and tracks peak concurrency
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        reject: Option<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl EntityStore for FlakyStore {
        async fn find_by_key(
            &self,
            entity_type: EntityType,
            key: &crate::types::NaturalKey,
        ) -> Result<Vec<StoredEntity>, StoreError> {
            self.inner.find_by_key(entity_type, key).await
        }

        async fn get(
            &self,
            entity_type: EntityType,
            id: &str,
        ) -> Result<Option<StoredEntity>, StoreError> {
            self.inner.get(entity_type, id).await
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<EntityId>, StoreError> {
            self.inner.find_user_by_email(email).await
        }

        async fn list(&self, entity_type: EntityType) -> Result<Vec<StoredEntity>, StoreError> {
            self.inner.list(entity_type).await
        }

        async fn insert(
            &self,
            entity_type: EntityType,
            fields: FieldMap,
            actor: &str,
        ) -> Result<StoredEntity, StoreError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.reject.as_deref() == fields.get("lesson_id").and_then(Value::as_str) {
                return Err(StoreError::constraint("rejected"));
            }
            self.inner.insert(entity_type, fields, actor).await
        }

        async fn update(
            &self,
            entity_type: EntityType,
            id: &str,
            patch: FieldMap,
        ) -> Result<StoredEntity, StoreError> {
            self.inner.update(entity_type, id, patch).await
        }

        async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), StoreError> {
            self.inner.delete(entity_type, id).await
        }
    }

    #[rstest]
    #[case::defaults(0, 0, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_SIZE)]
    #[case::in_flight_follows_batch(25, 0, 25, 25)]
    #[case::custom(25, 4, 25, 4)]
    fn test_config_zero_values_fallback(
        #[case] batch_size: usize,
        #[case] max_in_flight: usize,
        #[case] expected_batch: usize,
        #[case] expected_in_flight: usize,
    ) {
        let config = ExecutorConfig::new(batch_size, max_in_flight);
        assert_eq!(config.batch_size, expected_batch);
        assert_eq!(config.max_in_flight, expected_in_flight);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_is_isolated_and_concurrency_bounded() {
        let store = Arc::new(FlakyStore {
            reject: Some("l-3".into()),
            ..FlakyStore::default()
        });
        let audit = Arc::new(MemoryAuditSink::new());
        let executor = BatchExecutor::new(store.clone(), audit.clone(), ExecutorConfig::new(4, 2));

        let records: Vec<_> = (1..=6).map(|i| create(i, &format!("l-{}", i))).collect();
        let outcome = ImportOutcome::new(Uuid::nil(), EntityType::Lesson, 6, false);
        let progress = ProgressTracker::new(6);

        let outcome = executor
            .execute(&ctx(), records, Vec::new(), outcome, &progress)
            .await;

        assert_eq!(outcome.summary.imported, 5);
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.failed[0].position, 3);
        assert!(!outcome.success);
        assert!(store.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(progress.snapshot().processed, 6);

        // run started + 5 created + run completed
        assert_eq!(audit.entries().await.len(), 7);
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_unreached_records() {
        let store = Arc::new(MemoryStore::new());
        let token = CancellationToken::new();
        token.cancel();
        let audit = Arc::new(MemoryAuditSink::new());
        let executor = BatchExecutor::new(store.clone(), audit, ExecutorConfig::new(2, 2))
            .with_cancellation(token);

        let records = vec![create(1, "l-1"), create(2, "l-2")];
        let outcome = ImportOutcome::new(Uuid::nil(), EntityType::Lesson, 2, false);
        let outcome = executor
            .execute(&ctx(), records, Vec::new(), outcome, &ProgressTracker::new(2))
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.summary.skipped, 2);
        assert!(outcome.skipped.iter().all(|s| s.reason == CANCELLED_REASON));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_deletions_run_before_records() {
        let store = Arc::new(MemoryStore::new());
        let doomed = store.seed(EntityType::Lesson, fields(json!({"lesson_id": "old"})));
        let audit = Arc::new(MemoryAuditSink::new());
        let executor = BatchExecutor::new(store.clone(), audit, ExecutorConfig::default());

        let outcome = ImportOutcome::new(Uuid::nil(), EntityType::Lesson, 1, false);
        let records = vec![create(1, "new")];
        let outcome = executor
            .execute(&ctx(), records, vec![doomed], outcome, &ProgressTracker::new(1))
            .await;

        assert_eq!(outcome.summary.deleted, 1);
        assert_eq!(outcome.summary.imported, 1);
        assert_eq!(store.count(EntityType::Lesson), 1);
        assert!(outcome.success);
    }
}
