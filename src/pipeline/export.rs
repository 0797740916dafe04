//! Export of stored entities in import shape
//!
//! Exported rows carry content columns only (no id or timestamps), so feeding
//! an export back through `update_existing` matches every row and changes
//! nothing.

use crate::core::traits::EntityStore;
use crate::types::{EntityType, FieldMap, StoreError, StoredEntity};
use serde_json::{json, Value};
use tracing::info;

/// Stored entities of a type as import-shaped objects, in insertion order
pub async fn export_entities(
    store: &dyn EntityStore,
    entity_type: EntityType,
) -> Result<Vec<FieldMap>, StoreError> {
    let rows: Vec<FieldMap> = store
        .list(entity_type)
        .await?
        .iter()
        .map(StoredEntity::content_fields)
        .collect();

    info!(entity_type = %entity_type, count = rows.len(), "Exported entities");
    Ok(rows)
}

/// Exported entities wrapped as a JSON import envelope
pub async fn export_envelope(
    store: &dyn EntityStore,
    entity_type: EntityType,
) -> Result<Value, StoreError> {
    let data: Vec<Value> = export_entities(store, entity_type)
        .await?
        .into_iter()
        .map(Value::Object)
        .collect();

    Ok(json!({ "type": entity_type, "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::MemoryStore;
    use crate::io::json_format::parse_envelope;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_export_strips_metadata() {
        let store = MemoryStore::new();
        store.seed(EntityType::Lesson, fields(json!({"lesson_id": "llm-01", "title": "Tokens"})));
        store.seed(EntityType::Course, fields(json!({"title": "Rust 101"})));

        let rows = export_entities(&store, EntityType::Lesson).await.unwrap();
        assert_eq!(rows, vec![fields(json!({"lesson_id": "llm-01", "title": "Tokens"}))]);
    }

    #[tokio::test]
    async fn test_envelope_parses_back() {
        let store = MemoryStore::new();
        store.seed(EntityType::Course, fields(json!({"title": "Rust 101"})));

        let envelope = export_envelope(&store, EntityType::Course).await.unwrap();
        let parsed = parse_envelope(&envelope.to_string()).unwrap();

        assert_eq!(parsed.entity_type, EntityType::Course);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].fields, fields(json!({"title": "Rust 101"})));
    }
}
