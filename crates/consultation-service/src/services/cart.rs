//! Cart collaborator: atomic multi-line additions against pharmacy stock.
//!
//! `add_many` either adds every line or none. A line fails when the user's
//! resulting cart quantity would exceed the pharmacy-product stock.

use crate::errors::ConsultationError;
use crate::observability::metrics;
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;

/// One line to add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub pharmacy_product_id: i64,
    pub quantity: i32,
}

/// A stored cart entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct CartItem {
    pub pharmacy_product_id: i64,
    pub quantity: i32,
}

#[async_trait]
pub trait Cart: Send + Sync {
    /// Add all lines atomically. Fails with `NotEnoughStock` and leaves the
    /// cart untouched when any line cannot be satisfied.
    async fn add_many(&self, user_id: i64, lines: &[CartLine]) -> Result<(), ConsultationError>;

    /// Current cart contents of a user.
    async fn items(&self, user_id: i64) -> Result<Vec<CartItem>, ConsultationError>;
}

fn shortage(pharmacy_product_id: i64, requested: i64, available: i64) -> ConsultationError {
    ConsultationError::NotEnoughStock(format!(
        "Not enough stock for pharmacy product {pharmacy_product_id}: requested {requested}, available {available}"
    ))
}

/// Cart over the `cart_items` table.
#[derive(Clone)]
pub struct PgCart {
    pool: PgPool,
}

impl PgCart {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Cart for PgCart {
    #[instrument(skip_all, name = "cs.cart.add_many", fields(lines = lines.len()))]
    async fn add_many(&self, user_id: i64, lines: &[CartLine]) -> Result<(), ConsultationError> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        for line in lines {
            // Row lock on the offer serializes concurrent conversions of the same product.
            let offer: Option<(i32, bool)> = sqlx::query_as(
                r#"
                SELECT stock, is_active
                FROM pharmacy_products
                WHERE id = $1
                FOR UPDATE
                "#,
            )
            .bind(line.pharmacy_product_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((stock, true)) = offer else {
                tx.rollback().await?;
                return Err(shortage(line.pharmacy_product_id, i64::from(line.quantity), 0));
            };

            let (in_cart,): (i64,) = sqlx::query_as(
                r#"
                SELECT COALESCE(SUM(quantity), 0)::BIGINT
                FROM cart_items
                WHERE user_id = $1 AND pharmacy_product_id = $2
                "#,
            )
            .bind(user_id)
            .bind(line.pharmacy_product_id)
            .fetch_one(&mut *tx)
            .await?;

            let requested = in_cart + i64::from(line.quantity);
            if requested > i64::from(stock) {
                tx.rollback().await?;
                return Err(shortage(line.pharmacy_product_id, requested, i64::from(stock)));
            }

            sqlx::query(
                r#"
                INSERT INTO cart_items (user_id, pharmacy_product_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, pharmacy_product_id)
                DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
                "#,
            )
            .bind(user_id)
            .bind(line.pharmacy_product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::record_db_query("cart_add_many", "success", start.elapsed());
        Ok(())
    }

    #[instrument(skip_all, name = "cs.cart.items")]
    async fn items(&self, user_id: i64) -> Result<Vec<CartItem>, ConsultationError> {
        let items = sqlx::query_as::<_, CartItem>(
            r#"
            SELECT pharmacy_product_id, quantity
            FROM cart_items
            WHERE user_id = $1
            ORDER BY pharmacy_product_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}

/// In-memory cart for tests and the test harness.
pub mod mock {
    use super::*;
    use crate::services::catalog::mock::InMemoryCatalog;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Cart that checks stock against an [`InMemoryCatalog`].
    pub struct InMemoryCart {
        catalog: Arc<InMemoryCatalog>,
        lines: Mutex<BTreeMap<(i64, i64), i32>>,
    }

    impl InMemoryCart {
        pub fn new(catalog: Arc<InMemoryCatalog>) -> Self {
            Self {
                catalog,
                lines: Mutex::new(BTreeMap::new()),
            }
        }
    }

    #[async_trait]
    impl Cart for InMemoryCart {
        async fn add_many(
            &self,
            user_id: i64,
            lines: &[CartLine],
        ) -> Result<(), ConsultationError> {
            let mut cart = self.lines.lock().await;

            // Validate everything before touching the cart.
            for line in lines {
                let offer = self.catalog.offer(line.pharmacy_product_id).await;
                let stock = match offer {
                    Some(o) if o.is_active => i64::from(o.stock),
                    _ => 0,
                };
                let in_cart = cart
                    .get(&(user_id, line.pharmacy_product_id))
                    .copied()
                    .map_or(0, i64::from);
                let requested = in_cart + i64::from(line.quantity);
                if requested > stock {
                    return Err(shortage(line.pharmacy_product_id, requested, stock));
                }
            }

            for line in lines {
                *cart.entry((user_id, line.pharmacy_product_id)).or_insert(0) += line.quantity;
            }
            Ok(())
        }

        async fn items(&self, user_id: i64) -> Result<Vec<CartItem>, ConsultationError> {
            let cart = self.lines.lock().await;
            Ok(cart
                .iter()
                .filter(|((owner, _), _)| *owner == user_id)
                .map(|((_, pharmacy_product_id), quantity)| CartItem {
                    pharmacy_product_id: *pharmacy_product_id,
                    quantity: *quantity,
                })
                .collect())
        }
    }
}
