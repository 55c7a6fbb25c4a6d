//! Authoritative store for catalog entities.
//!
//! The cache never talks to this crate; service call sites read from it on a
//! cache miss and invalidate the cache after a successful commit.
//!
//! # Example
//!
//! ```ignore
//! use catalog_storage::{EntityStore, InMemoryStore, Product};
//!
//! let store = InMemoryStore::<Product>::new();
//! let saved = store.save(Product::new(1, "Laptop", price, 10)).await?;
//! assert!(saved.id > 0);
//! ```

pub mod entity;
pub mod error;
pub mod memory;
pub mod traits;

pub use entity::{Category, Entity, Product};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use traits::EntityStore;

/// Type alias for a shareable store of `E`.
pub type DynStore<E> = std::sync::Arc<dyn EntityStore<E>>;
