//! Bearer credential validation.
//!
//! Tokens are HS256 JWTs signed by the identity provider. Validation yields
//! a [`Principal`](crate::models::Principal) that handlers receive through
//! request extensions.

pub mod jwt;

pub use jwt::JwtValidator;
