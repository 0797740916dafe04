//! A reconciled run awaiting execution
//!
//! An `ImportPlan` holds one `PlannedRecord` per input record plus the
//! `replace_all` deletions. Before it is executed, a reviewer can inspect the
//! field-level diff of every pending update, narrow an update to the fields they
//! approve, or reject a record outright.

use crate::core::diff::{approved_patch, compute_diff, has_changes, DiffItem};
use crate::core::progress::ProgressTracker;
use crate::core::reconciler::PlannedRecord;
use crate::types::{
    EntityId, EntityType, FieldMap, ImportError, ImportOutcome, ImportPolicy,
    ReconciliationDecision, StoredEntity, ValidationReport,
};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// Reason recorded for a record a reviewer rejected
pub const REJECTED_REASON: &str = "rejected during review";

/// Diff of one pending update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordDiff {
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub target_id: EntityId,
    pub has_changes: bool,
    pub items: Vec<DiffItem>,
}

#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub run_id: Uuid,
    pub actor: String,
    pub entity_type: EntityType,
    pub policy: ImportPolicy,
    pub records: Vec<PlannedRecord>,
    pub deletions: Vec<StoredEntity>,
    pub validation: Option<ValidationReport>,
}

impl ImportPlan {
    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, position: usize) -> Option<&PlannedRecord> {
        self.records.iter().find(|r| r.position == position)
    }

    /// Field-level diffs of every pending update, in input order
    pub fn diffs(&self) -> Vec<RecordDiff> {
        self.records
            .iter()
            .filter_map(|planned| {
                let ReconciliationDecision::Update { target_id } = &planned.decision else {
                    return None;
                };
                let items = update_diff(self.entity_type, planned);
                Some(RecordDiff {
                    position: planned.position,
                    label: planned.label.clone(),
                    target_id: target_id.clone(),
                    has_changes: has_changes(&items),
                    items,
                })
            })
            .collect()
    }

    /// Narrow a pending update to the approved fields
    ///
    /// Unapproved changes keep their stored values. When nothing approved is an
    /// actual change the record is skipped instead.
    pub fn approve_fields<I, S>(&mut self, position: usize, fields: I) -> Result<(), ImportError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entity_type = self.entity_type;
        let planned = self.pending(position)?;
        if !matches!(planned.decision, ReconciliationDecision::Update { .. }) {
            return Err(ImportError::policy(format!(
                "record {} is not a pending update",
                position
            )));
        }

        let approved: HashSet<String> = fields.into_iter().map(Into::into).collect();
        let patch = approved_patch(&update_diff(entity_type, planned), &approved);

        if patch.is_empty() {
            planned.decision = ReconciliationDecision::Skip {
                reason: "no approved changes".to_string(),
            };
            planned.payload = FieldMap::new();
        } else {
            planned.payload = patch;
        }
        Ok(())
    }

    /// Drop a pending create or update from the run
    pub fn reject(&mut self, position: usize) -> Result<(), ImportError> {
        let planned = self.pending(position)?;
        if !planned.decision.is_mutating() {
            return Err(ImportError::policy(format!(
                "record {} has no pending change to reject",
                position
            )));
        }

        planned.decision = ReconciliationDecision::Skip {
            reason: REJECTED_REASON.to_string(),
        };
        planned.payload = FieldMap::new();
        Ok(())
    }

    /// The outcome this plan would produce, without touching the store
    pub fn preview(&self, progress: &ProgressTracker) -> ImportOutcome {
        let mut outcome = ImportOutcome::new(self.run_id, self.entity_type, self.total(), true);
        outcome.validation = self.validation.clone();

        for planned in &self.records {
            let label = planned.label.clone();
            match &planned.decision {
                ReconciliationDecision::Create => outcome.record_imported(
                    planned.position,
                    None,
                    label.unwrap_or_default(),
                    planned.payload.clone(),
                    planned.warnings.clone(),
                ),
                ReconciliationDecision::Update { target_id } => outcome.record_updated(
                    planned.position,
                    target_id.clone(),
                    label.unwrap_or_default(),
                    planned.payload.clone(),
                    planned.warnings.clone(),
                ),
                ReconciliationDecision::Skip { reason } => outcome.record_skipped(
                    planned.position,
                    label,
                    reason.clone(),
                    planned.existing.as_ref().map(|e| e.id.clone()),
                ),
                ReconciliationDecision::Fail { reason } => {
                    outcome.record_failed(planned.position, label, planned.input.clone(), reason)
                }
            }
            progress.record(!matches!(planned.decision, ReconciliationDecision::Fail { .. }));
        }

        outcome.finish(Some(self.deletions.len()))
    }

    fn pending(&mut self, position: usize) -> Result<&mut PlannedRecord, ImportError> {
        self.records
            .iter_mut()
            .find(|r| r.position == position)
            .ok_or_else(|| ImportError::policy(format!("no record at position {}", position)))
    }
}

/// Stored content against the content after merging the update payload
fn update_diff(entity_type: EntityType, planned: &PlannedRecord) -> Vec<DiffItem> {
    let old = planned
        .existing
        .as_ref()
        .map(StoredEntity::content_fields)
        .unwrap_or_default();

    let mut new = old.clone();
    for (field, value) in &planned.payload {
        new.insert(field.clone(), value.clone());
    }

    compute_diff(entity_type, &old, &new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::ChangeKind;
    use crate::types::{CandidateRecord, RecordStatus};
    use serde_json::{json, Value};

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn planned(position: usize, decision: ReconciliationDecision, payload: Value) -> PlannedRecord {
        let candidate = CandidateRecord::new(position, EntityType::Course, FieldMap::new());
        PlannedRecord {
            label: Some(format!("Course {}", position)),
            decision,
            payload: fields(payload),
            existing: Some(StoredEntity {
                id: "c-1".into(),
                entity_type: EntityType::Course,
                fields: fields(json!({
                    "id": "c-1",
                    "title": "Rust 101",
                    "level": "Beginner",
                    "price": "Free",
                    "created_at": "2025-01-01T00:00:00Z"
                })),
            }),
            ..PlannedRecord::skipped(&candidate, None, String::new())
        }
    }

    fn plan(records: Vec<PlannedRecord>) -> ImportPlan {
        ImportPlan {
            run_id: Uuid::nil(),
            actor: "admin-1".into(),
            entity_type: EntityType::Course,
            policy: ImportPolicy::default(),
            records,
            deletions: Vec::new(),
            validation: None,
        }
    }

    fn update() -> ReconciliationDecision {
        ReconciliationDecision::Update {
            target_id: "c-1".into(),
        }
    }

    #[test]
    fn test_diffs_cover_pending_updates_only() {
        let plan = plan(vec![
            planned(1, ReconciliationDecision::Create, json!({"title": "New"})),
            planned(
                2,
                update(),
                json!({"title": "Rust 101", "level": "Advanced", "price": "Free"}),
            ),
        ]);

        let diffs = plan.diffs();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].position, 2);
        assert!(diffs[0].has_changes);

        let changed: Vec<_> = diffs[0]
            .items
            .iter()
            .filter(|d| d.is_change())
            .map(|d| (d.field.as_str(), d.change))
            .collect();
        assert_eq!(changed, vec![("level", ChangeKind::Modified)]);
    }

    #[test]
    fn test_identical_update_has_no_changes() {
        let plan = plan(vec![planned(
            1,
            update(),
            json!({"title": "Rust 101", "level": "Beginner", "price": "Free"}),
        )]);
        assert!(!plan.diffs()[0].has_changes);
    }

    #[test]
    fn test_approve_fields_narrows_payload() {
        let mut plan = plan(vec![planned(
            1,
            update(),
            json!({"title": "Rust 101", "level": "Advanced", "price": "$10"}),
        )]);

        plan.approve_fields(1, ["level"]).unwrap();
        assert_eq!(plan.records[0].payload, fields(json!({"level": "Advanced"})));

        plan.approve_fields(1, ["price"]).unwrap();
        assert_eq!(
            plan.records[0].decision,
            ReconciliationDecision::Skip {
                reason: "no approved changes".into()
            }
        );
    }

    #[test]
    fn test_unsupplied_fields_survive_review() {
        // price is stored but the update does not supply it
        let mut plan = plan(vec![planned(
            1,
            update(),
            json!({"title": "Rust 101", "level": "Advanced"}),
        )]);

        let diffs = plan.diffs();
        let diff = &diffs[0];
        assert!(diff.items.iter().all(|d| d.change != ChangeKind::Removed));
        let price = diff.items.iter().find(|d| d.field == "price").unwrap();
        assert_eq!(price.change, ChangeKind::Unchanged);

        plan.approve_fields(1, ["level", "price"]).unwrap();
        assert_eq!(plan.records[0].payload, fields(json!({"level": "Advanced"})));
    }

    #[test]
    fn test_reject_and_review_errors() {
        let mut plan = plan(vec![
            planned(1, ReconciliationDecision::Create, json!({"title": "New"})),
            planned(2, ReconciliationDecision::Skip { reason: "exists".into() }, json!({})),
        ]);

        plan.reject(1).unwrap();
        assert_eq!(plan.records[0].decision.action(), "skip");

        assert!(plan.reject(2).is_err());
        assert!(plan.reject(9).is_err());
        assert!(plan.approve_fields(1, ["title"]).is_err());
    }

    #[test]
    fn test_preview_reports_would_counts() {
        let mut plan = plan(vec![
            planned(1, ReconciliationDecision::Create, json!({"title": "New"})),
            planned(2, update(), json!({"level": "Advanced"})),
        ]);
        plan.deletions.push(StoredEntity {
            id: "c-9".into(),
            entity_type: EntityType::Course,
            fields: FieldMap::new(),
        });
        let progress = ProgressTracker::new(2);

        let outcome = plan.preview(&progress);
        assert!(outcome.dry_run);
        assert_eq!(outcome.summary.would_import, Some(1));
        assert_eq!(outcome.summary.would_update, Some(1));
        assert_eq!(outcome.summary.would_delete, Some(1));
        assert_eq!(outcome.summary.imported, 0);
        assert_eq!(outcome.results[1].status, RecordStatus::WouldUpdate);
        assert!(progress.snapshot().is_complete());
    }
}
