//! Bearer-token utilities shared across the consultation workspace.
//!
//! This module provides common token handling:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Algorithm extraction from the token header
//! - HS256 signing and verification of bearer claims
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only HS256 is accepted; the header algorithm is checked before verification
//! - Generic error messages prevent information leakage
//! - The `sub` field in [`BearerClaims`] is redacted in Debug output
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_bearer, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! let claims = decode_bearer(token, secret.expose_secret().as_bytes())?;
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed token size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding or
/// signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default clock skew tolerance (5 minutes).
///
/// Tokens with `iat` timestamps more than this amount in the future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// The only signing algorithm accepted for bearer credentials.
pub const BEARER_ALGORITHM: &str = "HS256";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during token validation.
///
/// Every variant renders the same message so callers cannot learn which
/// check failed. Details are logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header names an algorithm other than HS256.
    #[error("The access token is invalid or expired")]
    UnsupportedAlgorithm,

    /// Signature does not verify against the configured secret.
    #[error("The access token is invalid or expired")]
    InvalidSignature,

    /// `exp` is in the past.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims carried by a bearer credential.
///
/// `sub` is the decimal subject id and `role` one of the role names in
/// [`crate::types::Role`]. Role parsing is left to the consumer so an
/// unknown role surfaces as an authorization failure rather than a
/// decoding failure.
#[derive(Clone, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Subject id - redacted in Debug output.
    pub sub: String,

    /// Role name.
    pub role: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for BearerClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerClaims")
            .field("sub", &"[REDACTED]")
            .field("role", &self.role)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `alg` field from a token header without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64 or invalid JSON
/// - `UnsupportedAlgorithm` - Header has no string `alg`
pub fn extract_alg(token: &str) -> Result<String, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    header
        .get("alg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::UnsupportedAlgorithm)
}

/// Verify an HS256 bearer credential and return its claims.
///
/// Checks, in order: size, header algorithm, signature, `exp`.
/// `iat` is validated separately with [`validate_iat`] so the caller
/// controls the clock skew.
///
/// # Errors
///
/// Returns the matching [`JwtValidationError`] variant for the first
/// failed check.
pub fn decode_bearer(token: &str, secret: &[u8]) -> Result<BearerClaims, JwtValidationError> {
    let alg = extract_alg(token)?;
    if alg != BEARER_ALGORITHM {
        tracing::debug!(target: "common.jwt", alg = %alg, "Token rejected: unsupported algorithm");
        return Err(JwtValidationError::UnsupportedAlgorithm);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<BearerClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtValidationError::Expired,
                ErrorKind::InvalidSignature => JwtValidationError::InvalidSignature,
                _ => JwtValidationError::MalformedToken,
            }
        })
}

/// Sign bearer claims with HS256.
///
/// # Errors
///
/// Returns `MalformedToken` if the claims cannot be serialized.
pub fn encode_bearer(claims: &BearerClaims, secret: &[u8]) -> Result<String, JwtValidationError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token signing failed");
        JwtValidationError::MalformedToken
    })
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Bounded by MAX_CLOCK_SKEW in every caller
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"an-hs256-test-secret-of-32-bytes!!";

    fn claims(exp_offset: i64) -> BearerClaims {
        let now = chrono::Utc::now().timestamp();
        BearerClaims {
            sub: "42".to_string(),
            role: "user".to_string(),
            exp: now + exp_offset,
            iat: now,
        }
    }

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_clock_skew_bounds() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // extract_alg Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_alg_valid_header() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let token = format!("{header_b64}.payload.signature");

        assert_eq!(extract_alg(&token).unwrap(), "HS256");
    }

    #[test]
    fn test_extract_alg_missing_alg() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT"}"#);
        let token = format!("{header_b64}.payload.signature");

        assert!(matches!(
            extract_alg(&token),
            Err(JwtValidationError::UnsupportedAlgorithm)
        ));
    }

    #[test]
    fn test_extract_alg_malformed_token() {
        assert!(matches!(
            extract_alg("not-a-jwt"),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            extract_alg(""),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            extract_alg("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_extract_alg_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert!(matches!(
            extract_alg(&oversized),
            Err(JwtValidationError::TokenTooLarge)
        ));
    }

    // -------------------------------------------------------------------------
    // decode_bearer / encode_bearer Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_accepts_token_signed_with_same_secret() {
        let token = encode_bearer(&claims(3600), SECRET).unwrap();
        let decoded = decode_bearer(&token, SECRET).unwrap();

        assert_eq!(decoded.sub, "42");
        assert_eq!(decoded.role, "user");
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        let token = encode_bearer(&claims(3600), SECRET).unwrap();
        let result = decode_bearer(&token, b"a-completely-different-secret-value");

        assert!(matches!(result, Err(JwtValidationError::InvalidSignature)));
    }

    #[test]
    fn test_decode_rejects_expired_token() {
        let token = encode_bearer(&claims(-10), SECRET).unwrap();
        let result = decode_bearer(&token, SECRET);

        assert!(matches!(result, Err(JwtValidationError::Expired)));
    }

    #[test]
    fn test_decode_rejects_other_algorithms() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload_b64 = URL_SAFE_NO_PAD.encode(r#"{"sub":"1","role":"admin","exp":9999999999,"iat":0}"#);
        let token = format!("{header_b64}.{payload_b64}.");

        assert!(matches!(
            decode_bearer(&token, SECRET),
            Err(JwtValidationError::UnsupportedAlgorithm)
        ));
    }

    // -------------------------------------------------------------------------
    // validate_iat Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_past_and_present() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_iat(now, DEFAULT_CLOCK_SKEW).is_ok());
        assert!(validate_iat(now - 3600, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_far_future() {
        let far_future = chrono::Utc::now().timestamp() + 86400;
        assert!(matches!(
            validate_iat(far_future, DEFAULT_CLOCK_SKEW),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000_i64;

        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert!(matches!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        ));
    }

    // -------------------------------------------------------------------------
    // BearerClaims Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_bearer_claims_debug_redacts_sub() {
        let mut c = claims(60);
        c.sub = "secret-subject-id".to_string();

        let debug_str = format!("{c:?}");

        assert!(!debug_str.contains("secret-subject-id"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("user"));
    }
}
