//! Types module
//!
//! Contains the data structures shared by every stage of an import run.
//! This module organizes types into logical submodules:
//! - `entity`: Entity types, natural keys and stored rows
//! - `catalog`: Typed course, event, lesson and enrollment records
//! - `record`: Candidate records and validation results
//! - `policy`: Duplicate handling and batching policy
//! - `outcome`: Reconciliation decisions and the run result document
//! - `audit`: Audit trail entries
//! - `error`: Error types for the import engine

pub mod audit;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod record;

pub use audit::{AuditAction, AuditEntry};
pub use entity::{EntityId, EntityType, FieldMap, NaturalKey, StoredEntity, METADATA_FIELDS};
pub use error::{ImportError, StoreError};
pub use outcome::{
    DuplicateGroup, ErrorDetail, ImportOutcome, ImportProgress, ImportSummary,
    ReconciliationDecision, RecordStatus, RunStatus, ValidationReport,
};
pub use policy::{DedupePolicy, DuplicateMode, ImportPolicy, PolicyOverrides};
pub use record::{CandidateRecord, FieldIssue, Severity, ValidatedRecord, ValidationResult};
