//! The store seam used by service call sites.

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::StorageResult;

/// Persistent storage for one entity type.
///
/// A successful `save` or `delete` means the change is committed; callers
/// invalidate cached copies only after that.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Reads an entity by ID. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing entities.
    async fn fetch_by_id(&self, id: i64) -> StorageResult<Option<E>>;

    /// Reads every entity, ordered by ID.
    async fn fetch_all(&self) -> StorageResult<Vec<E>>;

    /// Inserts the entity when its ID is 0, otherwise updates it.
    ///
    /// Returns the committed entity with its ID and audit timestamps set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when updating an ID that does not exist.
    async fn save(&self, entity: E) -> StorageResult<E>;

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the entity does not exist.
    async fn delete(&self, id: i64) -> StorageResult<()>;
}
