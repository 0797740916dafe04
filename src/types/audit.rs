//! Audit trail entries written while a run applies changes

use crate::types::entity::{EntityId, EntityType};
use crate::types::outcome::RunStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "status")]
pub enum AuditAction {
    RunStarted,
    Created,
    Updated,
    Deleted,
    RunCompleted(RunStatus),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub run_id: Uuid,
    pub actor: String,
    pub entity_type: EntityType,
    #[serde(flatten)]
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        run_id: Uuid,
        actor: &str,
        entity_type: EntityType,
        action: AuditAction,
        message: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            actor: actor.to_string(),
            entity_type,
            action,
            position: None,
            entity_id: None,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn for_record(mut self, position: Option<usize>, entity_id: &str) -> Self {
        self.position = position;
        self.entity_id = Some(entity_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audit_entry_serializes_action_and_status() {
        let entry = AuditEntry::new(
            Uuid::nil(),
            "admin-1",
            EntityType::Event,
            AuditAction::RunCompleted(RunStatus::CompletedWithErrors),
            "2 imported, 1 failed",
        );

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["action"], json!("run_completed"));
        assert_eq!(value["status"], json!("completed_with_errors"));
        assert_eq!(value["entity_type"], json!("event"));
        assert!(value.get("position").is_none());
    }

    #[test]
    fn test_for_record_sets_position_and_id() {
        let entry = AuditEntry::new(
            Uuid::nil(),
            "admin-1",
            EntityType::Course,
            AuditAction::Created,
            "created",
        )
        .for_record(Some(3), "c-9");
        assert_eq!(entry.position, Some(3));
        assert_eq!(entry.entity_id.as_deref(), Some("c-9"));

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["action"], json!("created"));
        assert!(value.get("status").is_none());
    }
}
