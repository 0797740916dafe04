//! Entity-level types shared by every stage of an import run
//!
//! This module defines the entity types an import can target, the identifiers and
//! field maps used to talk to the backing store, and the natural keys used to decide
//! whether an incoming record corresponds to something already stored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Store-generated entity identifier
pub type EntityId = String;

/// Column-name to value map, the shape rows take in the backing store
pub type FieldMap = Map<String, Value>;

/// Fields maintained by the store itself rather than by imports
pub const METADATA_FIELDS: [&str; 4] = ["id", "created_at", "updated_at", "created_by"];

/// Entity types supported by the import engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Course template (natural key: title)
    Course,

    /// Event template (natural key: name)
    Event,

    /// Micro-lesson with embedded questions (natural key: lesson_id)
    Lesson,

    /// User enrollment in a course (natural key: user + course)
    Enrollment,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Course,
        EntityType::Event,
        EntityType::Lesson,
        EntityType::Enrollment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Course => "course",
            EntityType::Event => "event",
            EntityType::Lesson => "lesson",
            EntityType::Enrollment => "enrollment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "course" | "courses" => Ok(EntityType::Course),
            "event" | "events" => Ok(EntityType::Event),
            "lesson" | "lessons" => Ok(EntityType::Lesson),
            "enrollment" | "enrollments" => Ok(EntityType::Enrollment),
            other => Err(format!(
                "unknown entity type '{}' (expected course, event, lesson or enrollment)",
                other
            )),
        }
    }
}

/// Natural key identifying a stored entity without its generated id
///
/// Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Title(String),
    Name(String),
    LessonId(String),
    Enrollment { user_id: EntityId, course_id: EntityId },
}

impl NaturalKey {
    /// Derive the natural key of a row of the given type from its fields
    ///
    /// Returns `None` when any key column is missing or blank.
    pub fn from_fields(entity_type: EntityType, fields: &FieldMap) -> Option<Self> {
        match entity_type {
            EntityType::Course => key_text(fields, "title").map(NaturalKey::Title),
            EntityType::Event => key_text(fields, "name").map(NaturalKey::Name),
            EntityType::Lesson => key_text(fields, "lesson_id").map(NaturalKey::LessonId),
            EntityType::Enrollment => Some(NaturalKey::Enrollment {
                user_id: key_text(fields, "user_id")?,
                course_id: key_text(fields, "course_id")?,
            }),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Title(title) => write!(f, "title '{}'", title),
            NaturalKey::Name(name) => write!(f, "name '{}'", name),
            NaturalKey::LessonId(id) => write!(f, "lesson_id '{}'", id),
            NaturalKey::Enrollment { user_id, course_id } => {
                write!(f, "user '{}' in course '{}'", user_id, course_id)
            }
        }
    }
}

/// Read a key column as text, accepting numeric identifiers
pub fn key_text(fields: &FieldMap, field: &str) -> Option<String> {
    match fields.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A row as held by the backing store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Store-generated identifier
    pub id: EntityId,

    /// Which table the row lives in
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Current column values, including store metadata
    pub fields: FieldMap,
}

impl StoredEntity {
    pub fn natural_key(&self) -> Option<NaturalKey> {
        NaturalKey::from_fields(self.entity_type, &self.fields)
    }

    /// Column values with store metadata removed
    pub fn content_fields(&self) -> FieldMap {
        self.fields
            .iter()
            .filter(|(k, _)| !METADATA_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
