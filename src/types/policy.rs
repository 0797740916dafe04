//! Caller-supplied import policy
//!
//! The policy decides what happens when an incoming record matches a stored
//! entity, whether anything is written at all (`dry_run`) and how the work is
//! chunked. A base policy comes from the CLI; the `options` object of a JSON
//! request is layered on top as `PolicyOverrides`.

use crate::types::error::ImportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of records applied per chunk
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// What to do with a valid record whose natural key already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMode {
    /// Always insert (enrollments fail instead, a pair cannot be duplicated)
    #[default]
    CreateOnly,

    /// Leave the stored entity alone
    SkipDuplicates,

    /// Merge the supplied fields into the stored entity
    UpdateExisting,

    /// Update matches and delete every stored entity missing from the input
    ReplaceAll,
}

impl DuplicateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateMode::CreateOnly => "create_only",
            DuplicateMode::SkipDuplicates => "skip_duplicates",
            DuplicateMode::UpdateExisting => "update_existing",
            DuplicateMode::ReplaceAll => "replace_all",
        }
    }
}

impl fmt::Display for DuplicateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "create_only" | "create" => Ok(DuplicateMode::CreateOnly),
            "skip_duplicates" | "skip" => Ok(DuplicateMode::SkipDuplicates),
            "update_existing" | "update" => Ok(DuplicateMode::UpdateExisting),
            "replace_all" | "replace" => Ok(DuplicateMode::ReplaceAll),
            other => Err(format!("unknown duplicate mode '{}'", other)),
        }
    }
}

/// Which record survives when one input repeats a natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupePolicy {
    FirstWins,
    LastWins,
}

impl FromStr for DedupePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "first_wins" | "first" => Ok(DedupePolicy::FirstWins),
            "last_wins" | "last" => Ok(DedupePolicy::LastWins),
            other => Err(format!("unknown dedupe policy '{}'", other)),
        }
    }
}

/// Effective policy for one import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportPolicy {
    pub mode: DuplicateMode,
    pub dry_run: bool,
    pub validate_first: bool,
    pub confirm_replace_all: bool,
    pub dedupe: Option<DedupePolicy>,
    pub batch_size: usize,

    /// Concurrent store operations within a chunk; defaults to `batch_size`
    pub max_in_flight: Option<usize>,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            mode: DuplicateMode::default(),
            dry_run: false,
            validate_first: false,
            confirm_replace_all: false,
            dedupe: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: None,
        }
    }
}

impl ImportPolicy {
    /// Layer request options on top of this policy
    ///
    /// An explicit `mode` wins over the legacy `update_existing` and
    /// `skip_duplicates` flags; `update_existing` wins over `skip_duplicates`.
    pub fn with_overrides(&self, overrides: &PolicyOverrides) -> Self {
        let mut policy = self.clone();

        if let Some(mode) = overrides.mode {
            policy.mode = mode;
        } else if overrides.update_existing == Some(true) {
            policy.mode = DuplicateMode::UpdateExisting;
        } else if overrides.skip_duplicates == Some(true) {
            policy.mode = DuplicateMode::SkipDuplicates;
        }

        if let Some(dry_run) = overrides.dry_run {
            policy.dry_run = dry_run;
        }
        if let Some(validate_first) = overrides.validate_first {
            policy.validate_first = validate_first;
        }
        if let Some(confirm) = overrides.confirm_replace_all {
            policy.confirm_replace_all = confirm;
        }
        if overrides.dedupe.is_some() {
            policy.dedupe = overrides.dedupe;
        }
        if let Some(batch_size) = overrides.batch_size {
            policy.batch_size = batch_size;
        }
        if overrides.max_in_flight.is_some() {
            policy.max_in_flight = overrides.max_in_flight;
        }

        policy
    }

    /// Check the policy before any record is processed
    ///
    /// A destructive `replace_all` needs explicit confirmation unless it is only a
    /// dry run.
    pub fn validated(self) -> Result<Self, ImportError> {
        if self.mode == DuplicateMode::ReplaceAll && !self.confirm_replace_all && !self.dry_run {
            return Err(ImportError::policy(
                "replace_all deletes stored entities missing from the input \
                 and requires confirm_replace_all",
            ));
        }

        Ok(self)
    }

    /// Concurrency within a chunk
    pub fn in_flight(&self) -> usize {
        self.max_in_flight.unwrap_or(self.batch_size)
    }
}

/// Optional policy settings carried by a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub mode: Option<DuplicateMode>,
    pub dry_run: Option<bool>,
    pub validate_first: Option<bool>,
    pub skip_duplicates: Option<bool>,
    pub update_existing: Option<bool>,
    pub confirm_replace_all: Option<bool>,
    pub dedupe: Option<DedupePolicy>,
    pub batch_size: Option<usize>,
    pub max_in_flight: Option<usize>,
}
