//! Consultation Room Service Library
//!
//! Doctor/patient consultation sessions for the pharmacy platform:
//!
//! - Durable, totally ordered chat transcripts
//! - Live rooms that fan messages out to both participants' sockets
//! - Session lifecycle with inactivity and pending-age auto-end
//! - Medical certificates and prescriptions rendered to PDF
//! - Prescription-to-cart conversion against pharmacy stock
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> orchestrator -> transcript (store of record)
//!                                        │        -> actors (registry, live delivery)
//!                                        │        -> artifacts, services (blob, catalog, cart)
//!                                        └──────── tasks/deadlines (auto-end timers)
//! ```
//!
//! # Modules
//!
//! - `actors` - Session registry and per-socket connection actors
//! - `artifacts` - Certificate and prescription rendering and publishing
//! - `auth` - Bearer credential validation
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP and WebSocket handlers
//! - `middleware` - Authentication and HTTP metrics
//! - `models` - Domain types and API bodies
//! - `observability` - Prometheus metrics
//! - `orchestrator` - Session state machine
//! - `routes` - Axum router setup
//! - `services` - Blob store, catalog and cart collaborators
//! - `tasks` - Background deadline timer
//! - `transcript` - Transcript store (Postgres and in-memory)

pub mod actors;
pub mod artifacts;
pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod routes;
pub mod services;
pub mod tasks;
pub mod transcript;
