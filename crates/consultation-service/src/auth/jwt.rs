//! JWT validation for the consultation service.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (via `common::jwt`)
//! - Only HS256 is accepted
//! - Expiration and issued-at claims are validated with clock skew tolerance
//! - Generic error messages prevent information leakage

use crate::errors::ConsultationError;
use crate::models::Principal;
use common::jwt::{decode_bearer, validate_iat};
use common::secret::{ExposeSecret, SecretString};
use common::types::Role;
use std::time::Duration;
use tracing::instrument;

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Verifies bearer credentials against the shared HS256 secret.
pub struct JwtValidator {
    secret: SecretString,
    clock_skew: Duration,
}

impl JwtValidator {
    /// Create a new validator.
    ///
    /// # Arguments
    ///
    /// * `secret` - HS256 verification secret
    /// * `clock_skew_seconds` - Tolerance for `iat` in the future
    pub fn new(secret: SecretString, clock_skew_seconds: i64) -> Self {
        Self {
            secret,
            clock_skew: Duration::from_secs(clock_skew_seconds.unsigned_abs()),
        }
    }

    /// Validate a token and project it to a [`Principal`].
    ///
    /// # Errors
    ///
    /// Returns `ConsultationError::InvalidToken` for every failure with the
    /// same message; the reason is logged at debug level.
    #[instrument(skip_all)]
    pub fn validate(&self, token: &str) -> Result<Principal, ConsultationError> {
        let claims = decode_bearer(token, self.secret.expose_secret().as_bytes()).map_err(|e| {
            tracing::debug!(target: "cs.auth.jwt", error = ?e, "Token verification failed");
            invalid_token()
        })?;

        if let Err(e) = validate_iat(claims.iat, self.clock_skew) {
            tracing::debug!(target: "cs.auth.jwt", error = ?e, "Token iat validation failed");
            return Err(invalid_token());
        }

        let id: i64 = claims.sub.parse().map_err(|_| {
            tracing::debug!(target: "cs.auth.jwt", "Token subject is not a numeric id");
            invalid_token()
        })?;

        let role: Role = claims.role.parse().map_err(|e| {
            tracing::debug!(target: "cs.auth.jwt", error = %e, "Token carries unknown role");
            invalid_token()
        })?;

        tracing::debug!(target: "cs.auth.jwt", role = %role, "Token validated successfully");
        Ok(Principal { id, role })
    }
}

fn invalid_token() -> ConsultationError {
    ConsultationError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
}
