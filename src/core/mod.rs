//! Core import logic
//!
//! This module contains the components of an import run:
//! - `traits` - Store and audit abstractions the engine depends on
//! - `rules` - Field-level coercion and format rules
//! - `validator` - Per-type record validation
//! - `matcher` - Natural-key lookup against the store
//! - `reconciler` - Per-record decisions and `replace_all` deletions
//! - `executor` - Chunked, bounded application of decisions
//! - `diff` - Field-level diffs for update review
//! - `progress` - Progress snapshots for observers
//! - `memory_store` / `audit_log` - In-process implementations of the traits

pub mod audit_log;
pub mod diff;
pub mod executor;
pub mod matcher;
pub mod memory_store;
pub mod progress;
pub mod reconciler;
pub mod rules;
pub mod traits;
pub mod validator;

pub use audit_log::{MemoryAuditSink, TracingAuditSink};
pub use executor::{BatchExecutor, ExecutorConfig, RunContext};
pub use matcher::{MatchResult, Matcher};
pub use memory_store::{MemoryStore, StoreSnapshot};
pub use progress::ProgressTracker;
pub use reconciler::{PlannedRecord, Reconciler};
pub use traits::{AuditSink, EntityStore};
pub use validator::validate;
