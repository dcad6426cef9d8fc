//! HTTP middleware for the consultation service.
//!
//! # Components
//!
//! - `auth` - Bearer authentication and role guard for `/users` and `/doctors`
//! - `http_metrics` - Request count and latency metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
