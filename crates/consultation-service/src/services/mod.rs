//! Collaborator contracts consumed by the orchestrator.
//!
//! Each contract is an `async_trait` with a production implementation
//! (Postgres or S3) and an in-memory implementation under `mock`.

pub mod blob_store;
pub mod cart;
pub mod catalog;

pub use blob_store::{BlobStore, S3BlobStore};
pub use cart::{Cart, CartItem, CartLine, PgCart};
pub use catalog::{Catalog, PgCatalog, PharmacyProduct, Product};
