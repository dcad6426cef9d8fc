//! Common utilities and types shared across the consultation workspace.

#![warn(clippy::pedantic)]

/// Module for shared identity types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for bearer-token utilities (validation, claims, constants)
pub mod jwt;
