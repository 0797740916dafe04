//! Collaborator traits for the backing store and the audit trail
//!
//! The engine never talks to a database directly. Everything it needs from
//! persistent storage goes through `EntityStore`, and audit entries go through
//! `AuditSink`, so the same pipeline runs against the in-memory store in tests
//! and against a hosted database in production.

use crate::types::{
    AuditEntry, EntityId, EntityType, FieldMap, NaturalKey, StoreError, StoredEntity,
};
use async_trait::async_trait;

/// Async access to the stored entities an import reads and writes
///
/// Implementations must be safe to call concurrently: the executor keeps several
/// operations in flight within a chunk.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// All stored entities of a type carrying the given natural key
    ///
    /// Usually zero or one; more than one means the store already holds duplicates.
    async fn find_by_key(
        &self,
        entity_type: EntityType,
        key: &NaturalKey,
    ) -> Result<Vec<StoredEntity>, StoreError>;

    /// Fetch one entity by id
    async fn get(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<StoredEntity>, StoreError>;

    /// Resolve a user account id from an email address (case-insensitive)
    async fn find_user_by_email(&self, email: &str) -> Result<Option<EntityId>, StoreError>;

    /// Every stored entity of a type, in insertion order
    async fn list(&self, entity_type: EntityType) -> Result<Vec<StoredEntity>, StoreError>;

    /// Insert a new row; the store assigns the id and timestamps
    async fn insert(
        &self,
        entity_type: EntityType,
        fields: FieldMap,
        actor: &str,
    ) -> Result<StoredEntity, StoreError>;

    /// Merge `patch` into an existing row; columns not in the patch are kept
    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        patch: FieldMap,
    ) -> Result<StoredEntity, StoreError>;

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), StoreError>;
}

/// Destination for audit entries
///
/// Appends are best effort: a failure is logged by the caller and never changes
/// the outcome of the record being audited.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError>;
}
