//! Natural-key matching of validated records against the store
//!
//! A store failure during lookup is always reported as an error for that record;
//! it is never mistaken for "no match", which would turn a transient outage into
//! duplicate inserts.

use crate::core::traits::EntityStore;
use crate::types::{
    EntityId, EntityType, ImportError, NaturalKey, StoreError, StoredEntity, ValidatedRecord,
};
use std::sync::Arc;
use tracing::debug;

/// Stored entities sharing the natural key of one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub matches: Vec<StoredEntity>,

    /// User id resolved from the email of an enrollment
    pub user_id: Option<EntityId>,
}

impl MatchResult {
    pub fn exists(&self) -> bool {
        !self.matches.is_empty()
    }

    /// The stored entity an update would target (the oldest match)
    pub fn target(&self) -> Option<&StoredEntity> {
        self.matches.first()
    }

    /// More than one stored entity already carries this key
    pub fn is_ambiguous(&self) -> bool {
        self.matches.len() > 1
    }
}

#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn EntityStore>,
}

impl Matcher {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn match_record(
        &self,
        position: usize,
        record: &ValidatedRecord,
    ) -> Result<MatchResult, ImportError> {
        let lookup_failed = |e: StoreError| ImportError::match_failed(position, &e);

        let user_id = match record {
            ValidatedRecord::Enrollment(enrollment) => {
                let user_id = self
                    .store
                    .find_user_by_email(&enrollment.email)
                    .await
                    .map_err(lookup_failed)?
                    .ok_or_else(|| ImportError::unknown_user(&enrollment.email))?;

                let course = self
                    .store
                    .get(EntityType::Course, &enrollment.course_id)
                    .await
                    .map_err(lookup_failed)?;
                if course.is_none() {
                    return Err(ImportError::Match {
                        position,
                        message: format!("course {} not found", enrollment.course_id),
                    });
                }

                Some(user_id)
            }
            _ => None,
        };

        let key: NaturalKey = record
            .natural_key(user_id.as_deref())
            .ok_or_else(|| ImportError::Match {
                position,
                message: "record has no natural key".to_string(),
            })?;

        let matches = self
            .store
            .find_by_key(record.entity_type(), &key)
            .await
            .map_err(lookup_failed)?;

        debug!(position, key = %key, matches = matches.len(), "Matched record");

        Ok(MatchResult { matches, user_id })
    }
}
