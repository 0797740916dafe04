//! Per-record reconciliation decisions
//!
//! # Decision table
//!
//! | valid | exists | create_only | skip_duplicates | update_existing | replace_all |
//! |-------|--------|-------------|-----------------|-----------------|-------------|
//! | no    | -      | fail        | fail            | fail            | fail        |
//! | yes   | no     | create      | create          | create          | create      |
//! | yes   | yes    | create      | skip            | update          | update      |
//!
//! Two refinements apply on top of the table: an existing enrollment under
//! `create_only` fails as already enrolled, since a user cannot hold the same
//! enrollment twice; and an update whose key matches several stored entities
//! fails instead of picking one.
//!
//! `replace_all` deletions are computed once per run, after every record has
//! been matched.

use crate::core::matcher::MatchResult;
use crate::types::{
    CandidateRecord, DedupePolicy, DuplicateMode, EntityId, EntityType, FieldMap, ImportError,
    NaturalKey, ReconciliationDecision, StoredEntity, ValidatedRecord, ValidationResult,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Everything the executor needs to apply one record
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRecord {
    pub position: usize,

    /// Human identification (title, name, lesson id, email and course)
    pub label: Option<String>,

    /// Raw input, echoed back when the record fails
    pub input: Value,

    pub decision: ReconciliationDecision,

    /// Columns to insert (create) or merge (update)
    pub payload: FieldMap,

    /// Stored entity the record matched, if any
    pub existing: Option<StoredEntity>,

    pub warnings: Vec<String>,
}

impl PlannedRecord {
    fn new(candidate: &CandidateRecord, decision: ReconciliationDecision) -> Self {
        Self {
            position: candidate.position,
            label: None,
            input: candidate.to_input(),
            decision,
            payload: FieldMap::new(),
            existing: None,
            warnings: Vec::new(),
        }
    }

    /// A planned record that will not touch the store
    pub fn failed(candidate: &CandidateRecord, reason: ImportError) -> Self {
        Self::new(candidate, ReconciliationDecision::Fail { reason })
    }

    pub fn skipped(candidate: &CandidateRecord, label: Option<String>, reason: String) -> Self {
        Self {
            label,
            ..Self::new(candidate, ReconciliationDecision::Skip { reason })
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    mode: DuplicateMode,
}

impl Reconciler {
    pub fn new(mode: DuplicateMode) -> Self {
        Self { mode }
    }

    /// Decide what to do with a valid, successfully matched record
    pub fn decide(
        &self,
        record: &ValidatedRecord,
        matched: &MatchResult,
    ) -> ReconciliationDecision {
        let Some(target) = matched.target() else {
            return ReconciliationDecision::Create;
        };

        match self.mode {
            DuplicateMode::CreateOnly => match record {
                ValidatedRecord::Enrollment(enrollment) => ReconciliationDecision::Fail {
                    reason: ImportError::already_enrolled(&enrollment.email, &enrollment.course_id),
                },
                _ => ReconciliationDecision::Create,
            },
            DuplicateMode::SkipDuplicates => ReconciliationDecision::Skip {
                reason: format!("{} already exists (id {})", record.entity_type(), target.id),
            },
            DuplicateMode::UpdateExisting | DuplicateMode::ReplaceAll => {
                if matched.is_ambiguous() {
                    let ids: Vec<&str> = matched.matches.iter().map(|m| m.id.as_str()).collect();
                    ReconciliationDecision::Fail {
                        reason: ImportError::Match {
                            position: 0,
                            message: format!(
                                "{} stored entities share this key ({}); refusing to pick one",
                                ids.len(),
                                ids.join(", ")
                            ),
                        },
                    }
                } else {
                    ReconciliationDecision::Update {
                        target_id: target.id.clone(),
                    }
                }
            }
        }
    }

    /// Plan one record from its validation and match results
    ///
    /// `matched` is `None` only for invalid records, which are never matched.
    pub fn plan_record(
        &self,
        candidate: &CandidateRecord,
        validation: &ValidationResult,
        matched: Option<Result<MatchResult, ImportError>>,
    ) -> PlannedRecord {
        let record = match (&validation.record, validation.is_valid) {
            (Some(record), true) => record,
            _ => return PlannedRecord::failed(candidate, validation.to_error()),
        };
        let label = Some(record.label());
        let warnings: Vec<String> = validation.warnings().map(|w| w.message.clone()).collect();

        let matched = match matched {
            Some(Ok(matched)) => matched,
            Some(Err(reason)) => {
                return PlannedRecord {
                    label,
                    warnings,
                    ..PlannedRecord::failed(candidate, reason)
                }
            }
            None => MatchResult::default(),
        };

        let decision = match self.decide(record, &matched) {
            ReconciliationDecision::Fail {
                reason: ImportError::Match { message, .. },
            } => ReconciliationDecision::Fail {
                reason: ImportError::Match {
                    position: candidate.position,
                    message,
                },
            },
            decision => decision,
        };

        let payload = if decision.is_mutating() {
            match build_payload(record, &decision, matched.user_id.as_deref()) {
                Ok(payload) => payload,
                Err(reason) => {
                    return PlannedRecord {
                        label,
                        warnings,
                        ..PlannedRecord::failed(candidate, reason)
                    }
                }
            }
        } else {
            FieldMap::new()
        };

        PlannedRecord {
            position: candidate.position,
            label,
            input: candidate.to_input(),
            decision,
            payload,
            existing: matched.target().cloned(),
            warnings,
        }
    }
}

fn build_payload(
    record: &ValidatedRecord,
    decision: &ReconciliationDecision,
    user_id: Option<&str>,
) -> Result<FieldMap, ImportError> {
    let mut payload = record.to_fields()?;
    if let Some(user_id) = user_id {
        payload.insert("user_id".to_string(), Value::String(user_id.to_string()));
    }
    if matches!(decision, ReconciliationDecision::Create) {
        record.apply_create_defaults(&mut payload);
    }
    Ok(payload)
}

/// Natural key readable from a raw candidate, even one that failed validation
///
/// Enrollments have no raw key: their key needs the resolved user id.
pub fn raw_key(candidate: &CandidateRecord) -> Option<NaturalKey> {
    match candidate.entity_type {
        EntityType::Event => NaturalKey::from_fields(EntityType::Event, &candidate.fields).or_else(
            || crate::types::entity::key_text(&candidate.fields, "title").map(NaturalKey::Name),
        ),
        EntityType::Enrollment => None,
        entity_type => NaturalKey::from_fields(entity_type, &candidate.fields),
    }
}

/// Stored entities a `replace_all` run deletes
///
/// An entity survives when a record matched it or when its natural key appears
/// anywhere in the input, including records that failed validation.
pub fn plan_deletions(
    stored: Vec<StoredEntity>,
    input_keys: &HashSet<NaturalKey>,
    matched_ids: &HashSet<EntityId>,
) -> Vec<StoredEntity> {
    stored
        .into_iter()
        .filter(|entity| !matched_ids.contains(&entity.id))
        .filter(|entity| {
            entity
                .natural_key()
                .map_or(true, |key| !input_keys.contains(&key))
        })
        .collect()
}

/// Records that lose to another record with the same key in one input
///
/// Returns loser position to winner position. Only valid records take part.
pub fn dedupe_losers(results: &[ValidationResult], policy: DedupePolicy) -> HashMap<usize, usize> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for result in results {
        if let (true, Some(record)) = (result.is_valid, &result.record) {
            groups.entry(record.input_key()).or_default().push(result.position);
        }
    }

    let mut losers = HashMap::new();
    for positions in groups.into_values().filter(|p| p.len() > 1) {
        let winner = match policy {
            DedupePolicy::FirstWins => positions[0],
            DedupePolicy::LastWins => positions[positions.len() - 1],
        };
        for position in positions.into_iter().filter(|p| *p != winner) {
            losers.insert(position, winner);
        }
    }
    losers
}
