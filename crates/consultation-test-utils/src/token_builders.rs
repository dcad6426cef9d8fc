//! Builder for signed bearer tokens.

use crate::test_ids::TEST_JWT_SECRET;
use chrono::{Duration, Utc};
use common::jwt::{encode_bearer, BearerClaims};
use common::types::Role;

/// Builder for HS256 bearer tokens accepted by the test server.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_doctor(7)
///     .expires_in(60)
///     .sign();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    role: String,
    exp: i64,
    iat: i64,
    secret: String,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (user 1, valid for an hour).
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "1".to_string(),
            role: Role::User.as_str().to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            secret: TEST_JWT_SECRET.to_string(),
        }
    }

    pub fn for_user(self, id: i64) -> Self {
        self.with_subject(&id.to_string()).with_role(Role::User.as_str())
    }

    pub fn for_doctor(self, id: i64) -> Self {
        self.with_subject(&id.to_string())
            .with_role(Role::Doctor.as_str())
    }

    /// Set a raw subject, numeric or not.
    pub fn with_subject(mut self, sub: &str) -> Self {
        self.sub = sub.to_string();
        self
    }

    /// Set a raw role name, known or not.
    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for an expired token).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Sign with another secret.
    pub fn signed_with(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    /// Encode and sign the token.
    pub fn sign(self) -> String {
        let claims = BearerClaims {
            sub: self.sub,
            role: self.role,
            exp: self.exp,
            iat: self.iat,
        };
        encode_bearer(&claims, self.secret.as_bytes()).expect("test token signing failed")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
