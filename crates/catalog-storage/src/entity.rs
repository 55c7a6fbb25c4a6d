//! Catalog entities.

use bigdecimal::BigDecimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A row the store can persist and the cache can hold.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity name used in errors and logs.
    const KIND: &'static str;

    fn id(&self) -> i64;

    fn assign_id(&mut self, id: i64);

    fn created(&self) -> OffsetDateTime;

    fn stamp_created(&mut self, at: OffsetDateTime);

    fn stamp_updated(&mut self, at: OffsetDateTime);
}

/// A product for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// 0 until the store assigns one.
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
}

impl Product {
    /// A product not yet saved.
    pub fn new(category_id: i64, name: impl Into<String>, price: BigDecimal, stock: i32) -> Self {
        Self {
            id: 0,
            category_id,
            name: name.into(),
            price,
            stock,
            created: OffsetDateTime::UNIX_EPOCH,
            updated: None,
        }
    }
}

impl Entity for Product {
    const KIND: &'static str = "Product";

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn created(&self) -> OffsetDateTime {
        self.created
    }

    fn stamp_created(&mut self, at: OffsetDateTime) {
        self.created = at;
    }

    fn stamp_updated(&mut self, at: OffsetDateTime) {
        self.updated = Some(at);
    }
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated: Option<OffsetDateTime>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            created: OffsetDateTime::UNIX_EPOCH,
            updated: None,
        }
    }
}

impl Entity for Category {
    const KIND: &'static str = "Category";

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn created(&self) -> OffsetDateTime {
        self.created
    }

    fn stamp_created(&mut self, at: OffsetDateTime) {
        self.created = at;
    }

    fn stamp_updated(&mut self, at: OffsetDateTime) {
        self.updated = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_product_json_shape() {
        let mut product = Product::new(3, "Laptop", BigDecimal::from_str("15000.50").unwrap(), 4);
        product.assign_id(1);

        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["category_id"], 3);
        assert_eq!(json["price"], "15000.50");
        assert_eq!(json["created"], "1970-01-01T00:00:00Z");
        assert!(json["updated"].is_null());

        let back: Product = serde_json::from_value(json).unwrap();
        assert_eq!(back, product);
    }

    #[test]
    fn test_stamps() {
        let mut category = Category::new("Electronics");
        let now = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap();
        category.stamp_created(now);
        category.stamp_updated(now);
        assert_eq!(category.created, now);
        assert_eq!(category.updated, Some(now));
    }
}
