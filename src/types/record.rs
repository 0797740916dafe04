//! Records as they move from the parser through the validator
//!
//! A `CandidateRecord` is a raw row exactly as parsed. The validator turns every
//! candidate into a `ValidationResult`, which carries a typed `ValidatedRecord`
//! when the row passed.

use crate::types::catalog::{Course, Enrollment, Event, Lesson};
use crate::types::entity::{EntityType, FieldMap, NaturalKey};
use crate::types::error::ImportError;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// A raw record from the input file
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// 1-based position in the input (CSV data row or JSON array index + 1)
    pub position: usize,

    /// Entity type declared for the whole input
    pub entity_type: EntityType,

    /// Raw field values; CSV cells are always strings
    pub fields: FieldMap,

    /// Set when the row could not be parsed into fields
    pub parse_issue: Option<String>,
}

impl CandidateRecord {
    pub fn new(position: usize, entity_type: EntityType, fields: FieldMap) -> Self {
        Self {
            position,
            entity_type,
            fields,
            parse_issue: None,
        }
    }

    /// A row the parser could not read; it fails validation unconditionally
    pub fn unparsable(
        position: usize,
        entity_type: EntityType,
        fields: FieldMap,
        issue: impl Into<String>,
    ) -> Self {
        Self {
            position,
            entity_type,
            fields,
            parse_issue: Some(issue.into()),
        }
    }

    /// The raw fields as a JSON object, echoed back in failure reports
    pub fn to_input(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A problem found with one field of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl FieldIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating one candidate record
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub position: usize,
    pub entity_type: EntityType,
    pub is_valid: bool,
    pub issues: Vec<FieldIssue>,

    /// Normalized record, present exactly when `is_valid`
    pub record: Option<ValidatedRecord>,
}

impl ValidationResult {
    pub fn warnings(&self) -> impl Iterator<Item = &FieldIssue> {
        self.issues.iter().filter(|issue| !issue.is_error())
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// The error to report when this record is not valid
    pub fn to_error(&self) -> ImportError {
        ImportError::Validation {
            position: self.position,
            issues: self.issues.clone(),
        }
    }
}

/// A record that passed validation, typed by entity
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedRecord {
    Course(Course),
    Event(Event),
    Lesson(Lesson),
    Enrollment(Enrollment),
}

impl ValidatedRecord {
    pub fn entity_type(&self) -> EntityType {
        match self {
            ValidatedRecord::Course(_) => EntityType::Course,
            ValidatedRecord::Event(_) => EntityType::Event,
            ValidatedRecord::Lesson(_) => EntityType::Lesson,
            ValidatedRecord::Enrollment(_) => EntityType::Enrollment,
        }
    }

    /// Store columns written by this record
    ///
    /// Only the optional columns the input supplied are present, so the map can be
    /// used as a merge patch.
    pub fn to_fields(&self) -> Result<FieldMap, ImportError> {
        let value = match self {
            ValidatedRecord::Course(course) => serde_json::to_value(course),
            ValidatedRecord::Event(event) => serde_json::to_value(event),
            ValidatedRecord::Lesson(lesson) => serde_json::to_value(lesson),
            ValidatedRecord::Enrollment(enrollment) => serde_json::to_value(enrollment),
        }
        .map_err(|e| ImportError::Serialization {
            message: e.to_string(),
        })?;

        match value {
            Value::Object(map) => Ok(map),
            other => Err(ImportError::Serialization {
                message: format!("expected an object, got {}", other),
            }),
        }
    }

    /// Natural key of the record
    ///
    /// Enrollments are keyed by the resolved user id, so they have no key until the
    /// matcher supplies one.
    pub fn natural_key(&self, user_id: Option<&str>) -> Option<NaturalKey> {
        match self {
            ValidatedRecord::Course(course) => Some(NaturalKey::Title(course.title.clone())),
            ValidatedRecord::Event(event) => Some(NaturalKey::Name(event.name.clone())),
            ValidatedRecord::Lesson(lesson) => Some(NaturalKey::LessonId(lesson.lesson_id.clone())),
            ValidatedRecord::Enrollment(enrollment) => Some(NaturalKey::Enrollment {
                user_id: user_id?.to_string(),
                course_id: enrollment.course_id.clone(),
            }),
        }
    }

    /// Human-readable identification for reports and logs
    pub fn label(&self) -> String {
        match self {
            ValidatedRecord::Course(course) => course.title.clone(),
            ValidatedRecord::Event(event) => event.name.clone(),
            ValidatedRecord::Lesson(lesson) => lesson.lesson_id.clone(),
            ValidatedRecord::Enrollment(enrollment) => {
                format!("{} -> {}", enrollment.email, enrollment.course_id)
            }
        }
    }

    /// Case-insensitive key used to find duplicates inside one input file
    pub fn input_key(&self) -> String {
        match self {
            ValidatedRecord::Course(course) => course.title.to_lowercase(),
            ValidatedRecord::Event(event) => event.name.to_lowercase(),
            ValidatedRecord::Lesson(lesson) => lesson.lesson_id.to_lowercase(),
            ValidatedRecord::Enrollment(enrollment) => {
                format!("{}|{}", enrollment.email, enrollment.course_id.to_lowercase())
            }
        }
    }

    /// Fill in columns that new rows get when the input leaves them out
    ///
    /// Only used for inserts; updates never receive defaults.
    pub fn apply_create_defaults(&self, fields: &mut FieldMap) {
        let defaults = match self {
            ValidatedRecord::Course(_) => json!({
                "is_active": true,
                "display": true,
                "currently_enrolling": true,
                "sort_order": 0,
                "prerequisites": "None",
            }),
            ValidatedRecord::Event(_) => json!({
                "is_active": true,
                "display": true,
                "is_featured": false,
            }),
            ValidatedRecord::Lesson(_) => json!({
                "is_active": true,
                "xp_reward": 40,
                "duration": "8 min",
            }),
            ValidatedRecord::Enrollment(_) => json!({
                "payment_status": "completed",
            }),
        };

        if let Value::Object(defaults) = defaults {
            for (field, value) in defaults {
                fields.entry(field).or_insert(value);
            }
        }
    }
}
