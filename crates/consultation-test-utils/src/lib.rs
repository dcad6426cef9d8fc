//! # Consultation Test Utilities
//!
//! Shared test utilities for the consultation service.
//!
//! This crate provides:
//! - Server test harness (`TestServer` for E2E tests, in-memory or Postgres)
//! - Signed bearer tokens (`TestTokenBuilder`)
//! - Fixed test ids and seed fixtures
//! - A room socket client (`RoomClient`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use consultation_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestServer::spawn().await?;
//!     let client = reqwest::Client::new();
//!
//!     let response = client
//!         .get(format!("{}/users/consultations", server.url()))
//!         .bearer_auth(server.user_token(TEST_USER_ID))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod room_client;
pub mod server_harness;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use fixtures::*;
pub use room_client::*;
pub use server_harness::*;
pub use test_ids::*;
pub use token_builders::*;
