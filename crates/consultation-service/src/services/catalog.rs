//! Catalog collaborator: product names and pharmacy offers.

use crate::errors::ConsultationError;
use crate::observability::metrics;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::time::Instant;
use tracing::instrument;

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub unit: String,
}

/// A product as offered by one pharmacy.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PharmacyProduct {
    pub id: i64,
    pub pharmacy_id: i64,
    pub product_id: i64,
    pub price: i64,
    pub weight: i32,
    pub stock: i32,
    pub is_active: bool,
}

/// Resolves product ids to catalog entries and pharmacy offers.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Products for the given ids. Unknown ids are absent from the result.
    async fn products(&self, ids: &[i64]) -> Result<Vec<Product>, ConsultationError>;

    /// Active offers of `pharmacy_id` for the given products. Products the
    /// pharmacy does not carry are absent from the result.
    async fn resolve(
        &self,
        pharmacy_id: i64,
        product_ids: &[i64],
    ) -> Result<Vec<PharmacyProduct>, ConsultationError>;
}

/// Catalog over the `products` and `pharmacy_products` tables.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    #[instrument(skip_all, name = "cs.catalog.products", fields(count = ids.len()))]
    async fn products(&self, ids: &[i64]) -> Result<Vec<Product>, ConsultationError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, unit
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("catalog_products", status, start.elapsed());
        Ok(result?)
    }

    #[instrument(skip_all, name = "cs.catalog.resolve", fields(pharmacy_id = pharmacy_id))]
    async fn resolve(
        &self,
        pharmacy_id: i64,
        product_ids: &[i64],
    ) -> Result<Vec<PharmacyProduct>, ConsultationError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, PharmacyProduct>(
            r#"
            SELECT id, pharmacy_id, product_id, price, weight, stock, is_active
            FROM pharmacy_products
            WHERE pharmacy_id = $1
              AND product_id = ANY($2)
              AND is_active = TRUE
            ORDER BY product_id
            "#,
        )
        .bind(pharmacy_id)
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query("catalog_resolve", status, start.elapsed());
        Ok(result?)
    }
}

/// In-memory catalog for tests and the test harness.
pub mod mock {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryCatalog {
        products: RwLock<BTreeMap<i64, Product>>,
        offers: RwLock<BTreeMap<i64, PharmacyProduct>>,
    }

    impl InMemoryCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn insert_product(&self, id: i64, name: &str, unit: &str) {
            self.products.write().await.insert(
                id,
                Product {
                    id,
                    name: name.to_string(),
                    unit: unit.to_string(),
                },
            );
        }

        /// Add an active offer and return its pharmacy-product id.
        pub async fn insert_offer(
            &self,
            pharmacy_id: i64,
            product_id: i64,
            price: i64,
            stock: i32,
        ) -> i64 {
            let mut offers = self.offers.write().await;
            let id = offers.keys().next_back().copied().unwrap_or(0) + 1;
            offers.insert(
                id,
                PharmacyProduct {
                    id,
                    pharmacy_id,
                    product_id,
                    price,
                    weight: 100,
                    stock,
                    is_active: true,
                },
            );
            id
        }

        /// Offer by pharmacy-product id, active or not.
        pub async fn offer(&self, pharmacy_product_id: i64) -> Option<PharmacyProduct> {
            self.offers.read().await.get(&pharmacy_product_id).cloned()
        }
    }

    #[async_trait]
    impl Catalog for InMemoryCatalog {
        async fn products(&self, ids: &[i64]) -> Result<Vec<Product>, ConsultationError> {
            let products = self.products.read().await;
            Ok(products
                .values()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        }

        async fn resolve(
            &self,
            pharmacy_id: i64,
            product_ids: &[i64],
        ) -> Result<Vec<PharmacyProduct>, ConsultationError> {
            let offers = self.offers.read().await;
            let mut resolved: Vec<PharmacyProduct> = offers
                .values()
                .filter(|o| {
                    o.pharmacy_id == pharmacy_id && o.is_active && product_ids.contains(&o.product_id)
                })
                .cloned()
                .collect();
            resolved.sort_by_key(|o| o.product_id);
            Ok(resolved)
        }
    }
}
