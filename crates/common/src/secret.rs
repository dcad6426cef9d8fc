//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with project-specific
//! guidance.
//!
//! `SecretBox<T>` and `SecretString` print `[REDACTED]` from `Debug`, so a
//! derived `Debug` on a settings struct never leaks the value. Both zeroize
//! on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct AuthSettings {
//!     clock_skew_seconds: i64,
//!     jwt_secret: SecretString,  // Debug shows "[REDACTED]"
//! }
//!
//! let settings = AuthSettings {
//!     clock_skew_seconds: 300,
//!     jwt_secret: SecretString::from("hs256-signing-secret"),
//! };
//!
//! println!("{:?}", settings);
//!
//! // Reading the value requires an explicit expose_secret()
//! let secret: &str = settings.jwt_secret.expose_secret();
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - The bearer-token signing secret
//! - Database URLs that embed credentials
//! - Raw bearer tokens held beyond a single request
//!
//! Use `SecretBox<T>` for:
//! - Binary key material (e.g., `SecretBox<Vec<u8>>`)
//!
//! # Serde Integration
//!
//! With the `serde` feature enabled, secrets can be deserialized from JSON:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct SigningSettings {
//!     issuer: String,
//!     secret: SecretString,
//! }
//!
//! let json = r#"{"issuer": "pharmacy-api", "secret": "hs256-secret"}"#;
//! let settings: SigningSettings = serde_json::from_str(json).unwrap();
//!
//! // Debug output is safe
//! println!("{:?}", settings);
//! // issuer is visible, secret is redacted
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hs256-signing-secret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("signing-secret"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("password123");
        assert_eq!(secret.expose_secret(), "password123");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct StoreSettings {
            bucket: String,
            database_url: SecretString,
        }

        let settings = StoreSettings {
            bucket: "consultations".to_string(),
            database_url: SecretString::from("postgres://app:pw@db/app"),
        };

        let debug_str = format!("{settings:?}");

        assert!(debug_str.contains("consultations"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("pw@db"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Credentials {
            username: String,
            password: SecretString,
        }

        let json = r#"{"username": "bob", "password": "my-secret-value"}"#;
        let creds: Credentials = serde_json::from_str(json).expect("deserialize");

        // Verify we can access the secret
        assert_eq!(creds.password.expose_secret(), "my-secret-value");

        // Verify debug doesn't expose the value
        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_box_bytes_are_redacted() {
        let key: SecretBox<Vec<u8>> = SecretBox::new(Box::new(b"raw-key-bytes".to_vec()));

        assert_eq!(key.expose_secret().as_slice(), b"raw-key-bytes");
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
