//! Bulk Import Library
//! # Overview
//!
//! This library imports catalog records (courses, events, lessons) and bulk
//! enrollments from CSV or JSON files, reconciling them against a backing store.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (records, policies, outcomes, errors)
//! - [`cli`] - CLI arguments parsing
//! - [`io`] - CSV and JSON parsing, failure reports
//! - [`core`] - Import logic:
//!   - [`core::validator`] - Per-type validation and normalization
//!   - [`core::matcher`] - Natural-key lookup against the store
//!   - [`core::reconciler`] - Create / update / skip / fail decisions
//!   - [`core::executor`] - Chunked, bounded application of decisions
//!   - [`core::diff`] - Field-level diffs for update review
//! - [`pipeline`] - Run orchestration and export
//!
//! # Duplicate Modes
//!
//! A valid record whose natural key already exists in the store is handled by
//! the run's duplicate mode:
//!
//! - **create_only**: Insert anyway (an existing enrollment fails instead)
//! - **skip_duplicates**: Leave the stored entity alone
//! - **update_existing**: Merge the supplied fields into the stored entity
//! - **replace_all**: Update matches and delete stored entities missing from the
//!   input (requires explicit confirmation)
//!
//! # Natural Keys
//!
//! - course: `title`
//! - event: `name`
//! - lesson: `lesson_id`
//! - enrollment: user (resolved from `email`) and `course_id`

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

pub use core::{EntityStore, MemoryStore};
pub use pipeline::{Caller, ImportPipeline, ImportPlan, ImportRequest};
pub use types::{
    DuplicateMode, EntityType, ImportError, ImportOutcome, ImportPolicy, StoreError,
};
