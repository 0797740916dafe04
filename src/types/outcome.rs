//! Decisions and results of an import run
//!
//! The reconciler produces one `ReconciliationDecision` per record; the executor
//! turns applied decisions into an `ImportOutcome`, the JSON document returned to
//! the caller.
//!
//! # Design
//!
//! Every record lands in exactly one of the `imported`, `updated`, `skipped` or
//! `failed` lists, and once more in the ordered `results` list. The summary
//! counters are derived from those lists when the outcome is finished, so the
//! two can never disagree.

use crate::types::entity::{EntityId, EntityType, FieldMap};
use crate::types::error::ImportError;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// What the executor will do with one record
#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationDecision {
    Create,
    Update { target_id: EntityId },
    Skip { reason: String },
    Fail { reason: ImportError },
}

impl ReconciliationDecision {
    pub fn action(&self) -> &'static str {
        match self {
            ReconciliationDecision::Create => "create",
            ReconciliationDecision::Update { .. } => "update",
            ReconciliationDecision::Skip { .. } => "skip",
            ReconciliationDecision::Fail { .. } => "fail",
        }
    }

    /// Whether applying the decision writes to the store
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ReconciliationDecision::Create | ReconciliationDecision::Update { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Imported,
    Updated,
    Skipped,
    Failed,
    WouldImport,
    WouldUpdate,
}

/// One error of a failed record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Per-record line of the ordered results list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResult {
    pub position: usize,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A created or updated record, echoed with the fields that were written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedItem {
    /// Store id; absent for a create that was only previewed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    pub position: usize,
    #[serde(flatten)]
    pub fields: FieldMap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedItem {
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub position: usize,
    pub input: Value,
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_import: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_update: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_delete: Option<usize>,
}

/// A `replace_all` deletion the store refused
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionFailure {
    pub id: EntityId,
    pub message: String,
}

/// Positions sharing one natural key inside the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: String,
    pub positions: Vec<usize>,
}

/// Whole-batch validation summary attached when `validate_first` is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub warnings: usize,
    pub duplicates: Vec<DuplicateGroup>,
}

/// Progress snapshot published while a run executes
///
/// Skipped records count as successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportProgress {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub percentage: u8,
}

impl ImportProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            percentage: if total == 0 { 100 } else { 0 },
            ..Self::default()
        }
    }

    pub fn record(&mut self, succeeded: bool) {
        self.processed += 1;
        if succeeded {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.percentage = match self.total {
            0 => 100,
            total => ((self.processed.min(total) * 100) / total) as u8,
        };
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Final status of a run, as written to the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Cancelled,
}

/// Result document of one import run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportOutcome {
    pub run_id: Uuid,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub success: bool,
    pub dry_run: bool,
    pub cancelled: bool,
    pub summary: ImportSummary,
    pub imported: Vec<ImportedItem>,
    pub updated: Vec<ImportedItem>,
    pub skipped: Vec<SkippedItem>,
    pub failed: Vec<FailedItem>,
    pub results: Vec<RecordResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deletion_errors: Vec<DeletionFailure>,
}

impl ImportOutcome {
    pub fn new(run_id: Uuid, entity_type: EntityType, total: usize, dry_run: bool) -> Self {
        Self {
            run_id,
            entity_type,
            success: false,
            dry_run,
            cancelled: false,
            summary: ImportSummary {
                total,
                ..ImportSummary::default()
            },
            imported: Vec::new(),
            updated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            results: Vec::new(),
            validation: None,
            deletion_errors: Vec::new(),
        }
    }

    /// A record was created (or would be, in a dry run)
    pub fn record_imported(
        &mut self,
        position: usize,
        id: Option<EntityId>,
        label: String,
        fields: FieldMap,
        warnings: Vec<String>,
    ) {
        let status = if self.dry_run {
            RecordStatus::WouldImport
        } else {
            RecordStatus::Imported
        };
        self.results.push(RecordResult {
            position,
            status,
            entity_id: id.clone(),
            label: Some(label),
            message: None,
            warnings,
        });
        self.imported.push(ImportedItem {
            id,
            position,
            fields,
        });
    }

    /// A record was merged into a stored entity (or would be, in a dry run)
    pub fn record_updated(
        &mut self,
        position: usize,
        id: EntityId,
        label: String,
        fields: FieldMap,
        warnings: Vec<String>,
    ) {
        let status = if self.dry_run {
            RecordStatus::WouldUpdate
        } else {
            RecordStatus::Updated
        };
        self.results.push(RecordResult {
            position,
            status,
            entity_id: Some(id.clone()),
            label: Some(label),
            message: None,
            warnings,
        });
        self.updated.push(ImportedItem {
            id: Some(id),
            position,
            fields,
        });
    }

    pub fn record_skipped(
        &mut self,
        position: usize,
        label: Option<String>,
        reason: String,
        existing_id: Option<EntityId>,
    ) {
        self.results.push(RecordResult {
            position,
            status: RecordStatus::Skipped,
            entity_id: existing_id.clone(),
            label: label.clone(),
            message: Some(reason.clone()),
            warnings: Vec::new(),
        });
        self.skipped.push(SkippedItem {
            position,
            label,
            reason,
            existing_id,
        });
    }

    pub fn record_failed(
        &mut self,
        position: usize,
        label: Option<String>,
        input: Value,
        error: &ImportError,
    ) {
        self.results.push(RecordResult {
            position,
            status: RecordStatus::Failed,
            entity_id: None,
            label,
            message: Some(error.to_string()),
            warnings: Vec::new(),
        });
        self.failed.push(FailedItem {
            position,
            input,
            errors: error.field_errors(),
        });
    }

    pub fn record_deleted(&mut self) {
        self.summary.deleted += 1;
    }

    pub fn record_deletion_failure(&mut self, id: EntityId, message: String) {
        self.deletion_errors.push(DeletionFailure { id, message });
    }

    /// Order every list by position and derive the summary counters
    pub fn finish(mut self, would_delete: Option<usize>) -> Self {
        self.results.sort_by_key(|r| r.position);
        self.imported.sort_by_key(|r| r.position);
        self.updated.sort_by_key(|r| r.position);
        self.skipped.sort_by_key(|r| r.position);
        self.failed.sort_by_key(|r| r.position);

        self.summary.skipped = self.skipped.len();
        self.summary.failed = self.failed.len();
        if self.dry_run {
            self.summary.imported = 0;
            self.summary.updated = 0;
            self.summary.deleted = 0;
            self.summary.would_import = Some(self.imported.len());
            self.summary.would_update = Some(self.updated.len());
            self.summary.would_delete = Some(would_delete.unwrap_or(0));
        } else {
            self.summary.imported = self.imported.len();
            self.summary.updated = self.updated.len();
        }

        self.success = self.failed.is_empty() && self.deletion_errors.is_empty();
        self
    }

    pub fn status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Cancelled
        } else if self.success {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(dry_run: bool) -> ImportOutcome {
        ImportOutcome::new(Uuid::nil(), EntityType::Course, 4, dry_run)
    }

    #[test]
    fn test_finish_derives_counts_and_orders_results() {
        let mut outcome = outcome(false);
        outcome.record_skipped(3, Some("C".into()), "already exists".into(), Some("c-3".into()));
        outcome.record_imported(1, Some("c-1".into()), "A".into(), FieldMap::new(), vec![]);
        outcome.record_failed(4, None, json!({}), &ImportError::parse("bad row"));
        outcome.record_updated(2, "c-2".into(), "B".into(), FieldMap::new(), vec![]);

        let outcome = outcome.finish(None);
        let positions: Vec<_> = outcome.results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
        assert_eq!(outcome.summary.imported, 1);
        assert_eq!(outcome.summary.updated, 1);
        assert_eq!(outcome.summary.skipped, 1);
        assert_eq!(outcome.summary.failed, 1);
        assert!(!outcome.success);
        assert_eq!(outcome.status(), RunStatus::CompletedWithErrors);
    }

    #[test]
    fn test_dry_run_reports_would_counts() {
        let mut outcome = outcome(true);
        outcome.record_imported(1, None, "A".into(), FieldMap::new(), vec![]);
        outcome.record_updated(2, "c-2".into(), "B".into(), FieldMap::new(), vec![]);

        let outcome = outcome.finish(Some(3));
        assert_eq!(outcome.summary.imported, 0);
        assert_eq!(outcome.summary.would_import, Some(1));
        assert_eq!(outcome.summary.would_update, Some(1));
        assert_eq!(outcome.summary.would_delete, Some(3));
        assert_eq!(outcome.results[0].status, RecordStatus::WouldImport);
        assert!(outcome.success);
    }

    #[test]
    fn test_imported_item_flattens_fields() {
        let mut fields = FieldMap::new();
        fields.insert("title".into(), json!("Rust 101"));
        let item = ImportedItem {
            id: Some("c-1".into()),
            position: 1,
            fields,
        };

        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"id": "c-1", "position": 1, "title": "Rust 101"})
        );
    }

    #[test]
    fn test_progress_percentage() {
        let mut progress = ImportProgress::new(3);
        progress.record(true);
        progress.record(false);
        assert_eq!(progress.percentage, 66);
        assert_eq!(progress.successful, 1);
        assert_eq!(progress.failed, 1);
        progress.record(true);
        assert!(progress.is_complete());
        assert_eq!(progress.percentage, 100);
        assert_eq!(ImportProgress::new(0).percentage, 100);
    }
}
