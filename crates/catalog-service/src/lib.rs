//! Catalog services: cache-aside reads and invalidate-after-commit writes.
//!
//! Reads go `cache → store → populate cache`. Writes go `store commit →
//! remove entity key → remove aggregate key`. A failed commit never touches
//! the cache.

pub mod category;
pub mod error;
pub mod product;

pub use category::{CategoryInput, CategoryService};
pub use error::{ServiceError, ServiceResult};
pub use product::{ProductInput, ProductService};

use std::time::Duration;

/// How long catalog reads stay cached.
pub const CATALOG_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
