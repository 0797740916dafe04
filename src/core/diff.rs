//! Field-level diffs between a stored entity and the state an update would produce
//!
//! Used to review updates before they are applied and to apply only a reviewer's
//! approved subset of changes. A `null` value and a missing column are treated
//! the same, so a column the store holds as `null` never shows up as a change.

use crate::types::{EntityType, FieldMap, METADATA_FIELDS};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCategory {
    Required,
    Optional,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffItem {
    pub field: String,
    pub label: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub change: ChangeKind,
    pub category: FieldCategory,
}

impl DiffItem {
    pub fn is_change(&self) -> bool {
        self.change != ChangeKind::Unchanged && self.category != FieldCategory::Metadata
    }
}

fn required_fields(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Course => &[
            "title",
            "description",
            "audiences",
            "mode",
            "duration",
            "price",
            "price_amount",
            "level",
            "start_date",
            "features",
            "keywords",
            "category",
        ],
        EntityType::Event => {
            &["name", "description", "event_type", "date", "price", "price_amount"]
        }
        EntityType::Lesson => &["lesson_id", "title", "skill"],
        EntityType::Enrollment => &["email", "user_id", "course_id"],
    }
}

pub fn field_category(entity_type: EntityType, field: &str) -> FieldCategory {
    if METADATA_FIELDS.contains(&field) {
        FieldCategory::Metadata
    } else if required_fields(entity_type).contains(&field) {
        FieldCategory::Required
    } else {
        FieldCategory::Optional
    }
}

/// Human label for a column
pub fn field_label(entity_type: EntityType, field: &str) -> String {
    let label = match (entity_type, field) {
        (EntityType::Course, "title") => "Course Title",
        (EntityType::Course, "mode") => "Course Mode",
        (EntityType::Lesson, "title") => "Lesson Title",
        (EntityType::Event, "name") => "Event Name",
        (EntityType::Event, "date") => "Event Date",
        (_, "audiences") => "Target Audiences",
        (_, "level") => "Difficulty Level",
        (_, "price_amount") => "Price (minor units)",
        (_, "payment_amount_minor") => "Payment Amount (minor units)",
        (_, "time") => "Start Time",
        (_, "instructor_info") => "Instructor Info",
        (_, "is_featured") => "Featured",
        (_, "is_active") => "Active",
        (_, "contact_info") => "Contact Information",
        (_, "xp_reward") => "XP Reward",
        (_, "lesson_id") => "Lesson ID",
        (_, "course_id") => "Course ID",
        (_, "user_id") => "User ID",
        (_, "id") => "ID",
        _ => return title_case(field),
    };
    label.to_string()
}

fn title_case(field: &str) -> String {
    field
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn present(fields: &FieldMap, field: &str) -> Option<Value> {
    fields.get(field).filter(|value| !value.is_null()).cloned()
}

/// Classify every column present on either side
///
/// Items are ordered required, optional, metadata, and by column name within
/// each group.
pub fn compute_diff(entity_type: EntityType, old: &FieldMap, new: &FieldMap) -> Vec<DiffItem> {
    let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    let mut items: Vec<DiffItem> = fields
        .into_iter()
        .filter_map(|field| {
            let old_value = present(old, field);
            let new_value = present(new, field);
            let change = match (&old_value, &new_value) {
                (None, None) => return None,
                (None, Some(_)) => ChangeKind::Added,
                (Some(_), None) => ChangeKind::Removed,
                (Some(a), Some(b)) if a == b => ChangeKind::Unchanged,
                (Some(_), Some(_)) => ChangeKind::Modified,
            };
            Some(DiffItem {
                field: field.clone(),
                label: field_label(entity_type, field),
                old_value,
                new_value,
                change,
                category: field_category(entity_type, field),
            })
        })
        .collect();

    items.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.field.cmp(&b.field)));
    items
}

/// Whether the diff contains any non-metadata change
pub fn has_changes(diff: &[DiffItem]) -> bool {
    diff.iter().any(DiffItem::is_change)
}

/// Update payload containing only the approved changes
///
/// Only changes that carry a new value can be approved: an update merges into
/// the stored row and never clears a column. Unapproved changes and metadata
/// columns are left out, so the stored values survive the merge.
pub fn approved_patch(diff: &[DiffItem], approved: &HashSet<String>) -> FieldMap {
    diff.iter()
        .filter(|item| item.is_change() && approved.contains(&item.field))
        .filter_map(|item| Some((item.field.clone(), item.new_value.clone()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_compute_diff_classifies_fields() {
        let old = fields(json!({
            "id": "c-1",
            "title": "Rust 101",
            "level": "Beginner",
            "tags": ["rust"],
            "location": null,
            "updated_at": "2025-01-01T00:00:00Z"
        }));
        let new = fields(json!({
            "id": "c-1",
            "title": "Rust 101",
            "level": "Advanced",
            "is_featured": true,
            "updated_at": "2025-02-01T00:00:00Z"
        }));

        let diff = compute_diff(EntityType::Course, &old, &new);
        let summary: Vec<_> = diff
            .iter()
            .map(|d| (d.field.as_str(), d.change, d.category))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("level", ChangeKind::Modified, FieldCategory::Required),
                ("title", ChangeKind::Unchanged, FieldCategory::Required),
                ("is_featured", ChangeKind::Added, FieldCategory::Optional),
                ("tags", ChangeKind::Removed, FieldCategory::Optional),
                ("id", ChangeKind::Unchanged, FieldCategory::Metadata),
                ("updated_at", ChangeKind::Modified, FieldCategory::Metadata),
            ]
        );
        assert_eq!(diff[0].label, "Difficulty Level");
        assert!(has_changes(&diff));
    }

    #[test]
    fn test_metadata_only_changes_are_not_changes() {
        let old = fields(json!({"title": "A", "updated_at": "x"}));
        let new = fields(json!({"title": "A", "updated_at": "y"}));
        assert!(!has_changes(&compute_diff(EntityType::Course, &old, &new)));
    }

    #[test]
    fn test_approved_patch_contains_only_approved_changes() {
        let old = fields(json!({"level": "Beginner", "tags": ["rust"], "price": "Free"}));
        let new = fields(json!({"level": "Advanced", "price": "$10"}));
        let diff = compute_diff(EntityType::Course, &old, &new);

        // tags is a removal: approving it never clears the stored column
        let approved: HashSet<String> = ["level".to_string(), "tags".to_string()].into();
        let patch = approved_patch(&diff, &approved);

        assert_eq!(patch, fields(json!({"level": "Advanced"})));
        assert!(!patch.values().any(Value::is_null));
    }

    #[test]
    fn test_field_labels() {
        assert_eq!(field_label(EntityType::Event, "name"), "Event Name");
        assert_eq!(field_label(EntityType::Course, "start_date"), "Start Date");
        assert_eq!(field_label(EntityType::Lesson, "xp_reward"), "XP Reward");
    }
}
