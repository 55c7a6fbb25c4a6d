//! Product service.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use catalog_cache::{Coordinator, KeySpace, PrefixInvalidation};
use catalog_storage::{Entity, EntityStore, Product};
use serde::Deserialize;

use crate::CATALOG_CACHE_TTL;
use crate::error::{ServiceError, ServiceResult};

/// Fields a caller supplies when creating or replacing a product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub category_id: i64,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
}

/// Product reads and writes with cache-aside caching.
///
/// Cached keys: `product:{id}` for single products and `product:all` for the
/// full list. Ranked and paged views are not cached.
pub struct ProductService<S: ?Sized> {
    store: Arc<S>,
    cache: Arc<Coordinator>,
    keys: KeySpace,
}

impl<S> ProductService<S>
where
    S: EntityStore<Product> + ?Sized,
{
    pub fn new(store: Arc<S>, cache: Arc<Coordinator>) -> Self {
        Self {
            store,
            cache,
            keys: KeySpace::new("product"),
        }
    }

    pub async fn get_product(&self, id: i64) -> ServiceResult<Arc<Product>> {
        let key = self.keys.entity(id);
        if let Some(cached) = self.cache.get::<Product>(&key).await {
            tracing::debug!(product_id = id, "product served from cache");
            return Ok(cached);
        }

        let Some(product) = self.store.fetch_by_id(id).await? else {
            tracing::warn!(product_id = id, "product not found");
            return Err(ServiceError::not_found(Product::KIND, id));
        };

        tracing::debug!(product_id = id, "product loaded from store, caching");
        let product = Arc::new(product);
        self.cache
            .set(&key, Product::clone(&product), Some(CATALOG_CACHE_TTL))
            .await;
        Ok(product)
    }

    pub async fn list_products(&self) -> ServiceResult<Arc<Vec<Product>>> {
        let key = self.keys.all();
        if let Some(cached) = self.cache.get::<Vec<Product>>(&key).await {
            tracing::debug!(count = cached.len(), "product list served from cache");
            return Ok(cached);
        }

        let products = self.store.fetch_all().await?;
        tracing::debug!(count = products.len(), "product list loaded from store, caching");
        self.cache
            .set(&key, products.clone(), Some(CATALOG_CACHE_TTL))
            .await;
        Ok(Arc::new(products))
    }

    /// The `count` most expensive products, highest price first.
    pub async fn top_priced(&self, count: usize) -> ServiceResult<Vec<Product>> {
        let mut products = self.store.fetch_all().await?;
        products.sort_by(|a, b| b.price.cmp(&a.price));
        products.truncate(count);
        Ok(products)
    }

    /// One page of products in ID order. `index` starts at 1; pages past the
    /// end are empty.
    pub async fn page(&self, index: usize, size: usize) -> ServiceResult<Vec<Product>> {
        if index == 0 || size == 0 {
            return Err(ServiceError::InvalidRequest(
                "page index and size must be at least 1".into(),
            ));
        }
        let Some(offset) = (index - 1).checked_mul(size) else {
            return Ok(Vec::new());
        };
        let products = self.store.fetch_all().await?;
        Ok(products.into_iter().skip(offset).take(size).collect())
    }

    pub async fn create_product(&self, input: ProductInput) -> ServiceResult<Product> {
        self.ensure_unique_name(&input.name, None).await?;

        let product = Product::new(input.category_id, input.name, input.price, input.stock);
        let saved = self.store.save(product).await?;

        self.invalidate(saved.id).await;
        tracing::info!(product_id = saved.id, name = %saved.name, "product created");
        Ok(saved)
    }

    pub async fn update_product(&self, id: i64, input: ProductInput) -> ServiceResult<Product> {
        let mut product = self.load(id).await?;
        self.ensure_unique_name(&input.name, Some(id)).await?;

        product.category_id = input.category_id;
        product.name = input.name;
        product.price = input.price;
        product.stock = input.stock;
        let saved = self.store.save(product).await?;

        self.invalidate(id).await;
        tracing::info!(product_id = id, name = %saved.name, "product updated");
        Ok(saved)
    }

    pub async fn update_stock(&self, id: i64, quantity: i32) -> ServiceResult<Product> {
        let mut product = self.load(id).await?;
        product.stock = quantity;
        let saved = self.store.save(product).await?;

        self.invalidate(id).await;
        tracing::info!(product_id = id, stock = quantity, "product stock updated");
        Ok(saved)
    }

    pub async fn delete_product(&self, id: i64) -> ServiceResult<()> {
        let product = self.load(id).await?;
        self.store.delete(id).await?;

        self.invalidate(id).await;
        tracing::info!(product_id = id, name = %product.name, "product deleted");
        Ok(())
    }

    /// Drop every cached product.
    ///
    /// The prefix sweep only reaches L2, so the list key is also removed
    /// explicitly to clear it from L1. Single-product entries already in L1
    /// stay until they expire.
    pub async fn purge_cache(&self) -> PrefixInvalidation {
        let outcome = self.cache.remove_by_prefix(self.keys.prefix()).await;
        self.cache.remove(&self.keys.all()).await;
        outcome
    }

    async fn load(&self, id: i64) -> ServiceResult<Product> {
        self.store.fetch_by_id(id).await?.ok_or_else(|| {
            tracing::warn!(product_id = id, "product not found");
            ServiceError::not_found(Product::KIND, id)
        })
    }

    async fn ensure_unique_name(&self, name: &str, except: Option<i64>) -> ServiceResult<()> {
        let taken = self
            .store
            .fetch_all()
            .await?
            .iter()
            .any(|p| p.name == name && Some(p.id) != except);
        if taken {
            tracing::warn!(name = %name, "product name already exists");
            return Err(ServiceError::Conflict(format!(
                "a product named '{name}' already exists"
            )));
        }
        Ok(())
    }

    /// Runs only after a successful commit.
    async fn invalidate(&self, id: i64) {
        self.cache.remove(&self.keys.entity(id)).await;
        self.cache.remove(&self.keys.all()).await;
    }
}
