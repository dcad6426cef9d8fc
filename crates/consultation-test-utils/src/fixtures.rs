//! Seed data for in-memory and Postgres test servers.
//!
//! Both seeders create the same world:
//! - verified doctor [`TEST_DOCTOR_ID`] and unverified doctor [`TEST_UNVERIFIED_DOCTOR_ID`]
//! - products [`TEST_PRODUCT_AMOXICILLIN`] and [`TEST_PRODUCT_PARACETAMOL`]
//! - pharmacy [`TEST_PHARMACY_ID`] stocking both (10 and 3 units)
//! - pharmacy [`TEST_EMPTY_PHARMACY_ID`] stocking nothing

use crate::test_ids::*;
use consultation_service::services::blob_store::mock::InMemoryBlobStore;
use consultation_service::services::cart::mock::InMemoryCart;
use consultation_service::services::catalog::mock::InMemoryCatalog;
use consultation_service::transcript::InMemoryTranscriptStore;
use sqlx::PgPool;
use std::sync::Arc;

/// Stock of [`TEST_PRODUCT_AMOXICILLIN`] at [`TEST_PHARMACY_ID`].
pub const AMOXICILLIN_STOCK: i32 = 10;

/// Stock of [`TEST_PRODUCT_PARACETAMOL`] at [`TEST_PHARMACY_ID`].
pub const PARACETAMOL_STOCK: i32 = 3;

/// In-memory collaborators behind a test server.
#[derive(Clone)]
pub struct MemoryCollaborators {
    pub store: Arc<InMemoryTranscriptStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub cart: Arc<InMemoryCart>,
}

impl MemoryCollaborators {
    /// Build and seed in-memory collaborators.
    pub async fn seeded() -> Self {
        let store = Arc::new(InMemoryTranscriptStore::new());
        store
            .insert_doctor(TEST_DOCTOR_ID, TEST_DOCTOR_NAME, true)
            .await;
        store
            .insert_doctor(TEST_UNVERIFIED_DOCTOR_ID, "Dr. Pending Review", false)
            .await;

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog
            .insert_product(TEST_PRODUCT_AMOXICILLIN, "Amoxicillin 500mg", "capsule")
            .await;
        catalog
            .insert_product(TEST_PRODUCT_PARACETAMOL, "Paracetamol 500mg", "tablet")
            .await;
        catalog
            .insert_offer(TEST_PHARMACY_ID, TEST_PRODUCT_AMOXICILLIN, 1_250, AMOXICILLIN_STOCK)
            .await;
        catalog
            .insert_offer(TEST_PHARMACY_ID, TEST_PRODUCT_PARACETAMOL, 300, PARACETAMOL_STOCK)
            .await;

        Self {
            store,
            blobs: Arc::new(InMemoryBlobStore::accepting(TEST_BLOB_BASE_URL)),
            cart: Arc::new(InMemoryCart::new(Arc::clone(&catalog))),
            catalog,
        }
    }
}

/// Seed a migrated database with the same world as [`MemoryCollaborators::seeded`].
pub async fn seed_postgres(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO doctors (id, name, is_verified) VALUES ($1, $2, TRUE), ($3, $4, FALSE)")
        .bind(TEST_DOCTOR_ID)
        .bind(TEST_DOCTOR_NAME)
        .bind(TEST_UNVERIFIED_DOCTOR_ID)
        .bind("Dr. Pending Review")
        .execute(pool)
        .await?;

    sqlx::query("INSERT INTO products (id, name, unit) VALUES ($1, $2, $3), ($4, $5, $6)")
        .bind(TEST_PRODUCT_AMOXICILLIN)
        .bind("Amoxicillin 500mg")
        .bind("capsule")
        .bind(TEST_PRODUCT_PARACETAMOL)
        .bind("Paracetamol 500mg")
        .bind("tablet")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO pharmacy_products (pharmacy_id, product_id, price, weight, stock, is_active)
        VALUES ($1, $2, 1250, 100, $3, TRUE), ($1, $4, 300, 100, $5, TRUE)
        "#,
    )
    .bind(TEST_PHARMACY_ID)
    .bind(TEST_PRODUCT_AMOXICILLIN)
    .bind(AMOXICILLIN_STOCK)
    .bind(TEST_PRODUCT_PARACETAMOL)
    .bind(PARACETAMOL_STOCK)
    .execute(pool)
    .await?;

    Ok(())
}
