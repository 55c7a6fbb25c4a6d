//! In-memory store.
//!
//! Entities live in an ordered map behind an async `RwLock`, so `fetch_all`
//! returns them in ID order. IDs come from an atomic sequence starting at 1.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::entity::Entity;
use crate::error::{StorageError, StorageResult};
use crate::traits::EntityStore;

/// In-memory [`EntityStore`].
pub struct InMemoryStore<E> {
    rows: RwLock<BTreeMap<i64, E>>,
    next_id: AtomicI64,
    fail_next_commit: AtomicBool,
}

impl<E: Entity> InMemoryStore<E> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Make the next `save` or `delete` fail without changing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_commit(&self) -> StorageResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::backend("commit failed"));
        }
        Ok(())
    }
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for InMemoryStore<E> {
    async fn fetch_by_id(&self, id: i64) -> StorageResult<Option<E>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn fetch_all(&self) -> StorageResult<Vec<E>> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn save(&self, mut entity: E) -> StorageResult<E> {
        let mut rows = self.rows.write().await;
        self.check_commit()?;

        let now = OffsetDateTime::now_utc();
        if entity.id() == 0 {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            entity.assign_id(id);
            entity.stamp_created(now);
            tracing::debug!(kind = E::KIND, id, "inserted entity");
        } else {
            let Some(existing) = rows.get(&entity.id()) else {
                return Err(StorageError::not_found(E::KIND, entity.id()));
            };
            // Creation time belongs to the stored row, not the caller's copy.
            entity.stamp_created(existing.created());
            entity.stamp_updated(now);
            tracing::debug!(kind = E::KIND, id = entity.id(), "updated entity");
        }

        rows.insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&id) {
            return Err(StorageError::not_found(E::KIND, id));
        }
        self.check_commit()?;
        rows.remove(&id);
        tracing::debug!(kind = E::KIND, id, "deleted entity");
        Ok(())
    }
}
