//! Cache key namespaces.
//!
//! Key format: `{namespace}:{id}` for single entities and `{namespace}:all`
//! for the aggregate list, e.g. `product:1` and `product:all`. Both share the
//! sweep prefix `product:`, so an L2 prefix sweep also clears the aggregate.

use std::fmt::Display;

/// Builds keys for one entity namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Create a key space for `namespace` (without the trailing colon).
    pub fn new(namespace: &str) -> Self {
        Self {
            prefix: format!("{namespace}:"),
        }
    }

    /// Key of a single entity.
    #[inline]
    pub fn entity(&self, id: impl Display) -> String {
        format!("{}{id}", self.prefix)
    }

    /// Key of the "all entities" list view.
    #[inline]
    pub fn all(&self) -> String {
        format!("{}all", self.prefix)
    }

    /// Prefix shared by every key in this namespace.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_share_prefix() {
        let products = KeySpace::new("product");
        assert_eq!(products.entity(1), "product:1");
        assert_eq!(products.all(), "product:all");
        assert_eq!(products.prefix(), "product:");
        assert!(products.entity(42).starts_with(products.prefix()));
        assert!(products.all().starts_with(products.prefix()));
    }

    #[test]
    fn test_namespaces_do_not_overlap() {
        let products = KeySpace::new("product");
        let categories = KeySpace::new("category");
        assert!(!categories.entity(1).starts_with(products.prefix()));
        assert!(!products.entity(1).starts_with(categories.prefix()));
    }
}
