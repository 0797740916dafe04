//! In-memory entity store
//!
//! `MemoryStore` implements `EntityStore` on top of `DashMap`, so concurrent
//! operations from one executor chunk can proceed without a global lock. The CLI
//! loads it from and saves it to a JSON snapshot file; tests seed it directly.
//!
//! # Design
//!
//! - Rows are keyed by `(EntityType, EntityId)` and carry an insertion sequence
//!   number so `list` returns them in a stable order.
//! - Users live in a separate map keyed by lowercased email.
//! - Enrollments are unique per `(user_id, course_id)`, like the unique index of
//!   the hosted database.
//! - Every call to `insert`, `update` or `delete` bumps a mutation counter, which
//!   lets tests prove that a dry run never writes.

use crate::core::traits::EntityStore;
use crate::types::{EntityId, EntityType, FieldMap, NaturalKey, StoreError, StoredEntity};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

/// Columns a merge update never overwrites
const IMMUTABLE_FIELDS: [&str; 3] = ["id", "created_at", "created_by"];

#[derive(Debug, Clone)]
struct Row {
    seq: u64,
    entity: StoredEntity,
}

/// Serializable image of a `MemoryStore`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Email to user id
    #[serde(default)]
    pub users: BTreeMap<String, EntityId>,

    #[serde(default)]
    pub entities: Vec<StoredEntity>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: DashMap<(EntityType, EntityId), Row>,
    users: DashMap<String, EntityId>,
    next_seq: AtomicU64,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user account and return its id
    pub fn add_user(&self, email: &str) -> EntityId {
        let id = Uuid::new_v4().to_string();
        self.users.insert(email.trim().to_lowercase(), id.clone());
        id
    }

    /// Insert a row without counting it as a mutation
    pub fn seed(&self, entity_type: EntityType, fields: FieldMap) -> StoredEntity {
        let entity = build_entity(entity_type, fields, "seed");
        self.put(entity.clone());
        entity
    }

    /// Number of stored rows of a type
    pub fn count(&self, entity_type: EntityType) -> usize {
        self.rows
            .iter()
            .filter(|row| row.key().0 == entity_type)
            .count()
    }

    /// Number of insert, update and delete calls received so far
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut rows: Vec<Row> = self.rows.iter().map(|row| row.value().clone()).collect();
        rows.sort_by_key(|row| row.seq);

        StoreSnapshot {
            users: self
                .users
                .iter()
                .map(|user| (user.key().clone(), user.value().clone()))
                .collect(),
            entities: rows.into_iter().map(|row| row.entity).collect(),
        }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for (email, id) in snapshot.users {
            store.users.insert(email.to_lowercase(), id);
        }
        for entity in snapshot.entities {
            store.put(entity);
        }
        store
    }

    /// Load a snapshot file; a missing file yields an empty store
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let snapshot: StoreSnapshot = serde_json::from_str(&text)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                debug!(
                    path = %path.display(),
                    entities = snapshot.entities.len(),
                    users = snapshot.users.len(),
                    "Loaded store snapshot"
                );
                Ok(Self::from_snapshot(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No store snapshot yet, starting empty");
                Ok(Self::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, text).await
    }

    fn put(&self, entity: StoredEntity) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.rows
            .insert((entity.entity_type, entity.id.clone()), Row { seq, entity });
    }

    fn matching(&self, entity_type: EntityType, key: &NaturalKey) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| row.key().0 == entity_type)
            .filter(|row| row.entity.natural_key().as_ref() == Some(key))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|row| row.seq);
        rows
    }
}

fn build_entity(entity_type: EntityType, mut fields: FieldMap, actor: &str) -> StoredEntity {
    let id = match fields.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => Uuid::new_v4().to_string(),
    };
    let now = Value::String(Utc::now().to_rfc3339());

    fields.insert("id".to_string(), Value::String(id.clone()));
    fields.entry("created_at").or_insert_with(|| now.clone());
    fields.insert("updated_at".to_string(), now);
    fields
        .entry("created_by")
        .or_insert_with(|| Value::String(actor.to_string()));

    StoredEntity {
        id,
        entity_type,
        fields,
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_key(
        &self,
        entity_type: EntityType,
        key: &NaturalKey,
    ) -> Result<Vec<StoredEntity>, StoreError> {
        Ok(self
            .matching(entity_type, key)
            .into_iter()
            .map(|row| row.entity)
            .collect())
    }

    async fn get(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<StoredEntity>, StoreError> {
        Ok(self
            .rows
            .get(&(entity_type, id.to_string()))
            .map(|row| row.entity.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<EntityId>, StoreError> {
        Ok(self
            .users
            .get(&email.trim().to_lowercase())
            .map(|id| id.value().clone()))
    }

    async fn list(&self, entity_type: EntityType) -> Result<Vec<StoredEntity>, StoreError> {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| row.key().0 == entity_type)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|row| row.seq);
        Ok(rows.into_iter().map(|row| row.entity).collect())
    }

    async fn insert(
        &self,
        entity_type: EntityType,
        fields: FieldMap,
        actor: &str,
    ) -> Result<StoredEntity, StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        if entity_type == EntityType::Enrollment {
            let key = NaturalKey::from_fields(entity_type, &fields).ok_or_else(|| {
                StoreError::constraint("enrollment requires user_id and course_id")
            })?;
            if !self.matching(entity_type, &key).is_empty() {
                return Err(StoreError::constraint(format!(
                    "duplicate enrollment for {}",
                    key
                )));
            }
        }

        let entity = build_entity(entity_type, fields, actor);
        self.put(entity.clone());
        Ok(entity)
    }

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        patch: FieldMap,
    ) -> Result<StoredEntity, StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        let mut row = self
            .rows
            .get_mut(&(entity_type, id.to_string()))
            .ok_or_else(|| StoreError::not_found(entity_type.as_str(), id))?;

        for (field, value) in patch {
            if !IMMUTABLE_FIELDS.contains(&field.as_str()) {
                row.entity.fields.insert(field, value);
            }
        }
        row.entity.fields.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        Ok(row.entity.clone())
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);

        self.rows
            .remove(&(entity_type, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(entity_type.as_str(), id))
    }
}
