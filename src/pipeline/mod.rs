//! Orchestration of an import run
//!
//! # Design
//!
//! A run has two phases:
//!
//! 1. `plan`: authorization gate, policy gate, validation, optional in-file
//!    dedupe, concurrent natural-key matching, reconciliation and `replace_all`
//!    deletions. Planning only reads from the store.
//! 2. `execute`: a dry run turns the plan into a preview outcome; otherwise the
//!    `BatchExecutor` applies it in chunks.
//!
//! Between the phases a caller may review the plan's update diffs and narrow or
//! reject individual records. `run` chains both phases without review.
//!
//! # Architecture
//!
//! ```text
//! ImportRequest → plan ──► ImportPlan ──► execute ──► ImportOutcome
//!                  │        (review)         │
//!                  ├── validator             └── BatchExecutor
//!                  ├── Matcher ──► reads         ├── EntityStore (writes)
//!                  └── Reconciler                └── AuditSink
//! ```

pub mod export;
pub mod plan;

pub use export::{export_entities, export_envelope};
pub use plan::{ImportPlan, RecordDiff};

use crate::core::executor::{BatchExecutor, ExecutorConfig, RunContext};
use crate::core::matcher::{MatchResult, Matcher};
use crate::core::progress::ProgressTracker;
use crate::core::reconciler::{dedupe_losers, plan_deletions, raw_key, PlannedRecord, Reconciler};
use crate::core::traits::{AuditSink, EntityStore};
use crate::core::validator::{batch_report, validate_all};
use crate::io::{parse_csv, parse_envelope};
use crate::types::{
    CandidateRecord, DuplicateMode, EntityId, EntityType, ImportError, ImportOutcome,
    ImportPolicy, NaturalKey, PolicyOverrides,
};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Roles allowed to run imports
pub const IMPORT_ROLES: [&str; 2] = ["admin", "super_admin"];

/// Resolved identity of whoever started the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: String,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }

    pub fn can_import(&self) -> bool {
        IMPORT_ROLES.contains(&self.role.as_str())
    }
}

/// Parsed records of one entity type plus the request's policy options
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub entity_type: EntityType,
    pub records: Vec<CandidateRecord>,
    pub overrides: PolicyOverrides,
}

impl ImportRequest {
    pub fn new(entity_type: EntityType, records: Vec<CandidateRecord>) -> Self {
        Self {
            entity_type,
            records,
            overrides: PolicyOverrides::default(),
        }
    }

    /// Parse a JSON envelope; its `options` become the request overrides
    pub fn from_json(input: &str) -> Result<Self, ImportError> {
        let envelope = parse_envelope(input)?;
        Ok(Self {
            entity_type: envelope.entity_type,
            records: envelope.records,
            overrides: envelope.options,
        })
    }

    pub fn from_csv(input: &str, entity_type: EntityType) -> Result<Self, ImportError> {
        Ok(Self::new(entity_type, parse_csv(input, entity_type)?))
    }

    pub fn with_overrides(mut self, overrides: PolicyOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

pub struct ImportPipeline {
    store: Arc<dyn EntityStore>,
    audit: Arc<dyn AuditSink>,
    policy: ImportPolicy,
    cancel: CancellationToken,
}

impl ImportPipeline {
    /// Create a pipeline with the base policy requests are layered on
    pub fn new(
        store: Arc<dyn EntityStore>,
        audit: Arc<dyn AuditSink>,
        policy: ImportPolicy,
    ) -> Self {
        Self {
            store,
            audit,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels execution between chunks
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate, match and reconcile a request without writing anything
    ///
    /// # Errors
    ///
    /// Run-level errors only: `Unauthenticated`, `Forbidden`, `PolicyViolation`,
    /// or `Io` when `replace_all` cannot list the stored entities. Every
    /// record-level problem is captured in the plan.
    pub async fn plan(
        &self,
        caller: Option<&Caller>,
        request: ImportRequest,
    ) -> Result<ImportPlan, ImportError> {
        let caller = authorize(caller)?;
        let policy = self.policy.with_overrides(&request.overrides).validated()?;
        let run_id = Uuid::new_v4();
        let entity_type = request.entity_type;
        let records = request.records;

        info!(
            run_id = %run_id,
            actor = %caller.id,
            entity_type = %entity_type,
            records = records.len(),
            mode = %policy.mode,
            dry_run = policy.dry_run,
            "Planning import"
        );

        let validations = validate_all(&records);
        let validation = policy.validate_first.then(|| batch_report(&validations));
        let losers = policy
            .dedupe
            .map(|dedupe| dedupe_losers(&validations, dedupe))
            .unwrap_or_default();

        let matcher = Matcher::new(Arc::clone(&self.store));
        let matches: Vec<Option<Result<MatchResult, ImportError>>> = stream::iter(&validations)
            .map(|validation| {
                let matcher = &matcher;
                let losers = &losers;
                async move {
                    let position = validation.position;
                    match &validation.record {
                        Some(record) if validation.is_valid && !losers.contains_key(&position) => {
                            Some(matcher.match_record(position, record).await)
                        }
                        _ => None,
                    }
                }
            })
            .buffered(policy.in_flight().max(1))
            .collect()
            .await;

        let reconciler = Reconciler::new(policy.mode);
        let mut planned = Vec::with_capacity(records.len());
        for ((candidate, validation), matched) in records.iter().zip(&validations).zip(matches) {
            let record = match losers.get(&candidate.position) {
                Some(winner) => PlannedRecord::skipped(
                    candidate,
                    validation.record.as_ref().map(|r| r.label()),
                    format!("duplicate of record {} in this input", winner),
                ),
                None => reconciler.plan_record(candidate, validation, matched),
            };
            planned.push(record);
        }

        let deletions = if policy.mode == DuplicateMode::ReplaceAll {
            let stored = self.store.list(entity_type).await.map_err(|e| {
                error!(error = %e, "Failed to list stored entities for replace_all");
                ImportError::Io {
                    message: format!("cannot list stored {} entities: {}", entity_type, e),
                }
            })?;

            let mut input_keys: HashSet<NaturalKey> = records.iter().filter_map(raw_key).collect();
            let mut matched_ids: HashSet<EntityId> = HashSet::new();
            for record in &planned {
                if let Some(existing) = &record.existing {
                    matched_ids.insert(existing.id.clone());
                    input_keys.extend(existing.natural_key());
                }
            }
            plan_deletions(stored, &input_keys, &matched_ids)
        } else {
            Vec::new()
        };

        info!(
            run_id = %run_id,
            deletions = deletions.len(),
            "Import planned"
        );

        Ok(ImportPlan {
            run_id,
            actor: caller.id.clone(),
            entity_type,
            policy,
            records: planned,
            deletions,
            validation,
        })
    }

    /// Apply a plan, or preview it when the plan's policy is a dry run
    pub async fn execute(&self, plan: ImportPlan) -> ImportOutcome {
        let progress = ProgressTracker::new(plan.total());
        self.execute_with_progress(plan, &progress).await
    }

    pub async fn execute_with_progress(
        &self,
        plan: ImportPlan,
        progress: &ProgressTracker,
    ) -> ImportOutcome {
        if plan.policy.dry_run {
            let outcome = plan.preview(progress);
            log_outcome(&outcome);
            return outcome;
        }

        let ctx = RunContext {
            run_id: plan.run_id,
            actor: plan.actor.clone(),
            entity_type: plan.entity_type,
        };
        let mut outcome = ImportOutcome::new(plan.run_id, plan.entity_type, plan.total(), false);
        outcome.validation = plan.validation.clone();

        let executor = BatchExecutor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.audit),
            ExecutorConfig::from_policy(&plan.policy),
        )
        .with_cancellation(self.cancel.clone());

        let outcome = executor
            .execute(&ctx, plan.records, plan.deletions, outcome, progress)
            .await;
        log_outcome(&outcome);
        outcome
    }

    /// Plan and execute without review
    pub async fn run(
        &self,
        caller: Option<&Caller>,
        request: ImportRequest,
    ) -> Result<ImportOutcome, ImportError> {
        let plan = self.plan(caller, request).await?;
        Ok(self.execute(plan).await)
    }
}

fn authorize(caller: Option<&Caller>) -> Result<&Caller, ImportError> {
    let caller = caller.ok_or(ImportError::Unauthenticated)?;
    if !caller.can_import() {
        return Err(ImportError::forbidden(&caller.role));
    }
    Ok(caller)
}

fn log_outcome(outcome: &ImportOutcome) {
    let summary = &outcome.summary;
    info!(
        run_id = %outcome.run_id,
        status = ?outcome.status(),
        dry_run = outcome.dry_run,
        total = summary.total,
        imported = summary.imported,
        updated = summary.updated,
        skipped = summary.skipped,
        failed = summary.failed,
        deleted = summary.deleted,
        "Import finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit_log::MemoryAuditSink;
    use crate::core::memory_store::MemoryStore;
    use crate::types::DedupePolicy;
    use rstest::rstest;

    fn pipeline(store: Arc<MemoryStore>, policy: ImportPolicy) -> ImportPipeline {
        ImportPipeline::new(store, Arc::new(MemoryAuditSink::new()), policy)
    }

    fn lessons(csv: &str) -> ImportRequest {
        ImportRequest::from_csv(csv, EntityType::Lesson).unwrap()
    }

    const LESSONS: &str = "lesson_id,title,skill,duration,description\n\
        llm-01,Tokens,LLMs,5 min,What a token is\n\
        llm-02,Context,LLMs,5 min,Context windows\n";

    #[rstest]
    #[case::no_caller(None, "Authentication required")]
    #[case::wrong_role(Some(Caller::new("u-1", "instructor")), "Role 'instructor'")]
    #[tokio::test]
    async fn test_auth_gate_runs_before_any_record(
        #[case] caller: Option<Caller>,
        #[case] expected: &str,
    ) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone(), ImportPolicy::default());

        let err = pipeline.run(caller.as_ref(), lessons(LESSONS)).await.unwrap_err();
        assert!(err.to_string().contains(expected), "got {}", err);
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_unconfirmed_replace_all_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let policy = ImportPolicy {
            mode: DuplicateMode::ReplaceAll,
            ..ImportPolicy::default()
        };
        let pipeline = pipeline(store.clone(), policy);

        let err = pipeline
            .run(Some(&Caller::new("a-1", "admin")), lessons(LESSONS))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::PolicyViolation { .. }));
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_dedupe_skips_losers() {
        let store = Arc::new(MemoryStore::new());
        let policy = ImportPolicy {
            dedupe: Some(DedupePolicy::FirstWins),
            ..ImportPolicy::default()
        };
        let pipeline = pipeline(store.clone(), policy);
        let csv = "lesson_id,title,skill\nllm-01,Tokens,LLMs\nLLM-01,Tokens again,LLMs\n";

        let outcome = pipeline
            .run(Some(&Caller::new("a-1", "super_admin")), lessons(csv))
            .await
            .unwrap();

        assert_eq!(outcome.summary.imported, 1);
        assert_eq!(outcome.summary.skipped, 1);
        assert_eq!(outcome.skipped[0].position, 2);
        assert_eq!(outcome.skipped[0].reason, "duplicate of record 1 in this input");
        assert_eq!(store.count(EntityType::Lesson), 1);
    }

    #[tokio::test]
    async fn test_reviewed_plan_applies_only_approved_fields() {
        let store = Arc::new(MemoryStore::new());
        let caller = Caller::new("a-1", "admin");
        pipeline(store.clone(), ImportPolicy::default())
            .run(Some(&caller), lessons(LESSONS))
            .await
            .unwrap();

        let policy = ImportPolicy {
            mode: DuplicateMode::UpdateExisting,
            ..ImportPolicy::default()
        };
        let pipeline = pipeline(store.clone(), policy);
        let csv = "lesson_id,title,skill,duration,description\n\
            llm-01,Tokens v2,LLMs,7 min,What a token is\n\
            llm-02,Context v2,LLMs,5 min,Context windows\n";

        let mut plan = pipeline.plan(Some(&caller), lessons(csv)).await.unwrap();
        assert_eq!(plan.diffs().len(), 2);
        plan.approve_fields(1, ["title"]).unwrap();
        plan.reject(2).unwrap();

        let outcome = pipeline.execute(plan).await;
        assert_eq!(outcome.summary.updated, 1);
        assert_eq!(outcome.summary.skipped, 1);

        let rows = export_entities(store.as_ref(), EntityType::Lesson).await.unwrap();
        assert_eq!(rows[0].get("title"), Some(&serde_json::json!("Tokens v2")));
        assert_eq!(rows[0].get("duration"), Some(&serde_json::json!("5 min")));
        assert_eq!(rows[1].get("title"), Some(&serde_json::json!("Context")));
    }

    #[tokio::test]
    async fn test_validate_first_attaches_report() {
        let store = Arc::new(MemoryStore::new());
        let policy = ImportPolicy {
            validate_first: true,
            ..ImportPolicy::default()
        };
        let csv = "lesson_id,title,skill\nllm-01,Tokens,LLMs\n,Missing id,LLMs\n";

        let outcome = pipeline(store, policy)
            .run(Some(&Caller::new("a-1", "admin")), lessons(csv))
            .await
            .unwrap();

        let report = outcome.validation.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 1);
    }
}
