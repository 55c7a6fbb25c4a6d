//! Category service.

use std::sync::Arc;

use catalog_cache::{Coordinator, KeySpace};
use catalog_storage::{Category, Entity, EntityStore};
use serde::Deserialize;

use crate::CATALOG_CACHE_TTL;
use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
}

/// Category reads and writes, cached under `category:{id}` and `category:all`.
pub struct CategoryService<S: ?Sized> {
    store: Arc<S>,
    cache: Arc<Coordinator>,
    keys: KeySpace,
}

impl<S> CategoryService<S>
where
    S: EntityStore<Category> + ?Sized,
{
    pub fn new(store: Arc<S>, cache: Arc<Coordinator>) -> Self {
        Self {
            store,
            cache,
            keys: KeySpace::new("category"),
        }
    }

    pub async fn get_category(&self, id: i64) -> ServiceResult<Arc<Category>> {
        let key = self.keys.entity(id);
        if let Some(cached) = self.cache.get::<Category>(&key).await {
            return Ok(cached);
        }

        let category = self
            .store
            .fetch_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(Category::KIND, id))?;

        let category = Arc::new(category);
        self.cache
            .set(&key, Category::clone(&category), Some(CATALOG_CACHE_TTL))
            .await;
        Ok(category)
    }

    pub async fn list_categories(&self) -> ServiceResult<Arc<Vec<Category>>> {
        let key = self.keys.all();
        if let Some(cached) = self.cache.get::<Vec<Category>>(&key).await {
            return Ok(cached);
        }

        let categories = self.store.fetch_all().await?;
        self.cache
            .set(&key, categories.clone(), Some(CATALOG_CACHE_TTL))
            .await;
        Ok(Arc::new(categories))
    }

    pub async fn create_category(&self, input: CategoryInput) -> ServiceResult<Category> {
        self.ensure_unique_name(&input.name, None).await?;
        let saved = self.store.save(Category::new(input.name)).await?;

        self.invalidate(saved.id).await;
        tracing::info!(category_id = saved.id, name = %saved.name, "category created");
        Ok(saved)
    }

    pub async fn update_category(&self, id: i64, input: CategoryInput) -> ServiceResult<Category> {
        let mut category = self
            .store
            .fetch_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(Category::KIND, id))?;
        self.ensure_unique_name(&input.name, Some(id)).await?;

        category.name = input.name;
        let saved = self.store.save(category).await?;

        self.invalidate(id).await;
        tracing::info!(category_id = id, name = %saved.name, "category updated");
        Ok(saved)
    }

    pub async fn delete_category(&self, id: i64) -> ServiceResult<()> {
        self.store.delete(id).await?;
        self.invalidate(id).await;
        tracing::info!(category_id = id, "category deleted");
        Ok(())
    }

    async fn ensure_unique_name(&self, name: &str, except: Option<i64>) -> ServiceResult<()> {
        let taken = self
            .store
            .fetch_all()
            .await?
            .iter()
            .any(|c| c.name == name && Some(c.id) != except);
        if taken {
            return Err(ServiceError::Conflict(format!(
                "a category named '{name}' already exists"
            )));
        }
        Ok(())
    }

    async fn invalidate(&self, id: i64) {
        self.cache.remove(&self.keys.entity(id)).await;
        self.cache.remove(&self.keys.all()).await;
    }
}
