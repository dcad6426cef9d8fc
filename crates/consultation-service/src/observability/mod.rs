//! Observability for the consultation service.
//!
//! Provides metrics definitions and the Prometheus recorder.

pub mod metrics;
