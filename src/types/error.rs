//! Error types for the bulk import engine
//!
//! This module defines every error an import run can produce plus the error type
//! of the backing store collaborator.
//!
//! # Error Categories
//!
//! - **Run-level errors**: the input cannot be parsed, the policy is not allowed or
//!   the caller may not import. The run stops before any record is processed.
//! - **Record-level errors**: a single record is invalid, cannot be matched or cannot
//!   be written. The record is reported as failed and the run continues.

use crate::types::outcome::ErrorDetail;
use crate::types::record::FieldIssue;
use thiserror::Error;

/// Errors returned by an `EntityStore` implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store could not be reached or timed out
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// The targeted row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    /// The store rejected the write (unique key, foreign key, ...)
    #[error("constraint violation: {message}")]
    Constraint { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        StoreError::Constraint {
            message: message.into(),
        }
    }
}

/// Main error type for the import engine
///
/// Each variant carries enough context to be shown to an administrator next to
/// the offending record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportError {
    /// The input file could not be parsed at all
    ///
    /// Fatal: no record is processed.
    #[error(
        "Parse error{}: {message}",
        line.map(|l| format!(" at line {}", l)).unwrap_or_default()
    )]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// I/O error while reading input or writing output
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The requested policy is not allowed as given
    ///
    /// Fatal: raised before any record is processed.
    #[error("Policy violation: {message}")]
    PolicyViolation { message: String },

    /// No caller identity was supplied
    #[error("Authentication required to run an import")]
    Unauthenticated,

    /// The caller is known but may not run imports
    #[error("Role '{role}' is not allowed to run imports (admin or super_admin required)")]
    Forbidden { role: String },

    /// The record failed validation
    #[error("Record {position} is invalid: {}", summarize(.issues))]
    Validation {
        position: usize,
        issues: Vec<FieldIssue>,
    },

    /// The store lookup for the record failed
    ///
    /// Never treated as "not found".
    #[error("Record {position} could not be matched: {message}")]
    Match { position: usize, message: String },

    /// An enrollment referenced an email with no user account
    #[error("No user found with email {email}")]
    UnknownUser { email: String },

    /// An enrollment for this user and course already exists
    #[error("User {email} is already enrolled in course {course_id}")]
    AlreadyEnrolled { email: String, course_id: String },

    /// The store rejected the create, update or delete
    #[error("Record {position} could not be written: {message}")]
    Write { position: usize, message: String },

    /// A validated record could not be converted to a store row
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<std::io::Error> for ImportError {
    fn from(error: std::io::Error) -> Self {
        ImportError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for ImportError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        ImportError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<csv_async::Error> for ImportError {
    fn from(error: csv_async::Error) -> Self {
        ImportError::Parse {
            line: None,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(error: serde_json::Error) -> Self {
        let line = match error.line() {
            0 => None,
            line => Some(line as u64),
        };

        ImportError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl ImportError {
    /// Create a Parse error without line information
    pub fn parse(message: impl Into<String>) -> Self {
        ImportError::Parse {
            line: None,
            message: message.into(),
        }
    }

    /// Create a PolicyViolation error
    pub fn policy(message: impl Into<String>) -> Self {
        ImportError::PolicyViolation {
            message: message.into(),
        }
    }

    /// Create a Forbidden error
    pub fn forbidden(role: &str) -> Self {
        ImportError::Forbidden {
            role: role.to_string(),
        }
    }

    /// Create a Match error from a failed store lookup
    pub fn match_failed(position: usize, error: &StoreError) -> Self {
        ImportError::Match {
            position,
            message: error.to_string(),
        }
    }

    /// Create an UnknownUser error
    pub fn unknown_user(email: &str) -> Self {
        ImportError::UnknownUser {
            email: email.to_string(),
        }
    }

    /// Create an AlreadyEnrolled error
    pub fn already_enrolled(email: &str, course_id: &str) -> Self {
        ImportError::AlreadyEnrolled {
            email: email.to_string(),
            course_id: course_id.to_string(),
        }
    }

    /// Create a Write error from a failed store mutation
    pub fn write_failed(position: usize, error: &StoreError) -> Self {
        ImportError::Write {
            position,
            message: error.to_string(),
        }
    }

    /// Whether this error aborts the whole run
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            ImportError::Parse { .. }
                | ImportError::Io { .. }
                | ImportError::PolicyViolation { .. }
                | ImportError::Unauthenticated
                | ImportError::Forbidden { .. }
        )
    }

    /// Per-field error details for a failed record
    ///
    /// Validation errors expand to one entry per error-severity issue; every other
    /// error becomes a single entry without a field.
    pub fn field_errors(&self) -> Vec<ErrorDetail> {
        match self {
            ImportError::Validation { issues, .. } => issues
                .iter()
                .filter(|issue| issue.is_error())
                .map(|issue| ErrorDetail {
                    field: Some(issue.field.clone()),
                    message: issue.message.clone(),
                })
                .collect(),
            ImportError::UnknownUser { .. } | ImportError::AlreadyEnrolled { .. } => {
                vec![ErrorDetail {
                    field: Some("email".to_string()),
                    message: self.to_string(),
                }]
            }
            other => vec![ErrorDetail {
                field: None,
                message: other.to_string(),
            }],
        }
    }
}
