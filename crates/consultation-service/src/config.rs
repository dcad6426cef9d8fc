//! Consultation service configuration.
//!
//! Configuration is loaded from environment variables once at start-up.
//! Sensitive fields are redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default object-store bucket.
pub const DEFAULT_BLOB_BUCKET: &str = "consultations";

/// Default upload cap for chat files (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Minimum length of the bearer-token signing secret.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Default inactivity deadline for active sessions (30 minutes).
pub const DEFAULT_INACTIVITY_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Default creation-age cap for sessions nobody joined (1 hour).
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Default grace period before an empty room is released (5 minutes).
pub const DEFAULT_EMPTY_ROOM_GRACE: Duration = Duration::from_secs(5 * 60);

/// Default per-handle outbound send deadline.
pub const DEFAULT_OUTBOUND_SEND_DEADLINE: Duration = Duration::from_millis(2000);

/// Default depth of the registry dispatcher queue.
pub const DEFAULT_DISPATCHER_QUEUE_DEPTH: usize = 1024;

/// Default graceful-shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Room timing and queueing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSettings {
    /// Active session is auto-ended after this long without a new message.
    pub inactivity_deadline: Duration,
    /// Pending session is auto-ended this long after creation.
    pub pending_ttl: Duration,
    /// Empty room is released after this long.
    pub empty_room_grace: Duration,
    /// A handle whose socket write takes longer than this is dropped.
    pub outbound_send_deadline: Duration,
    /// Bound of the registry dispatcher queue.
    pub dispatcher_queue_depth: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            inactivity_deadline: DEFAULT_INACTIVITY_DEADLINE,
            pending_ttl: DEFAULT_PENDING_TTL,
            empty_room_grace: DEFAULT_EMPTY_ROOM_GRACE,
            outbound_send_deadline: DEFAULT_OUTBOUND_SEND_DEADLINE,
            dispatcher_queue_depth: DEFAULT_DISPATCHER_QUEUE_DEPTH,
        }
    }
}

/// Consultation service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// HS256 secret used to verify bearer credentials.
    pub jwt_secret: SecretString,

    /// JWT clock skew tolerance in seconds for iat validation.
    pub jwt_clock_skew_seconds: i64,

    /// Object-store bucket for uploads and artifacts.
    pub blob_bucket: String,

    /// Public URL prefix for stored objects.
    pub blob_public_base_url: String,

    /// Maximum accepted chat upload size in bytes.
    pub max_upload_bytes: usize,

    /// Room timing and queueing options.
    pub room: RoomSettings,

    /// Seconds to wait for in-flight requests on shutdown.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("blob_bucket", &self.blob_bucket)
            .field("blob_public_base_url", &self.blob_public_base_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("room", &self.room)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT configuration: {0}")]
    InvalidJwt(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwt_secret = vars
            .get("JWT_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::InvalidJwt(format!(
                "JWT_SECRET must be at least {} bytes",
                MIN_JWT_SECRET_BYTES
            )));
        }
        let jwt_secret = SecretString::from(jwt_secret.clone());

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwt(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwt(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwt(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let blob_bucket = vars
            .get("BLOB_BUCKET")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BLOB_BUCKET.to_string());

        let blob_public_base_url = vars
            .get("BLOB_PUBLIC_BASE_URL")
            .cloned()
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", blob_bucket))
            .trim_end_matches('/')
            .to_string();

        let max_upload_bytes = parse_positive(vars, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        let room = RoomSettings {
            inactivity_deadline: Duration::from_secs(parse_positive(
                vars,
                "INACTIVITY_DEADLINE_SECONDS",
                DEFAULT_INACTIVITY_DEADLINE.as_secs(),
            )?),
            pending_ttl: Duration::from_secs(parse_positive(
                vars,
                "PENDING_TTL_SECONDS",
                DEFAULT_PENDING_TTL.as_secs(),
            )?),
            empty_room_grace: Duration::from_secs(parse_positive(
                vars,
                "EMPTY_ROOM_GRACE_SECONDS",
                DEFAULT_EMPTY_ROOM_GRACE.as_secs(),
            )?),
            outbound_send_deadline: Duration::from_millis(parse_positive(
                vars,
                "OUTBOUND_SEND_DEADLINE_MS",
                DEFAULT_OUTBOUND_SEND_DEADLINE.as_millis() as u64,
            )?),
            dispatcher_queue_depth: parse_positive(
                vars,
                "DISPATCHER_QUEUE_DEPTH",
                DEFAULT_DISPATCHER_QUEUE_DEPTH,
            )?,
        };

        let drain_seconds = parse_positive(vars, "DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS)?;

        Ok(Config {
            database_url,
            bind_address,
            jwt_secret,
            jwt_clock_skew_seconds,
            blob_bucket,
            blob_public_base_url,
            max_upload_bytes,
            room,
            drain_seconds,
        })
    }

    /// Signing secret bytes for token verification.
    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }
}

/// Parse an optional positive integer variable, falling back to `default`.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid positive integer, got '{}': {}", value_str, e),
    })?;

    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/consultations_test".to_string(),
            ),
            ("JWT_SECRET".to_string(), TEST_SECRET.to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(
            config.jwt_clock_skew_seconds,
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        );
        assert_eq!(config.blob_bucket, "consultations");
        assert_eq!(
            config.blob_public_base_url,
            "https://consultations.s3.amazonaws.com"
        );
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.room, RoomSettings::default());
        assert_eq!(config.room.empty_room_grace, Duration::from_secs(300));
        assert_eq!(config.jwt_secret_bytes(), TEST_SECRET.as_bytes());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("BLOB_BUCKET".to_string(), "rx-files".to_string());
        vars.insert(
            "BLOB_PUBLIC_BASE_URL".to_string(),
            "https://cdn.example.com/".to_string(),
        );
        vars.insert("INACTIVITY_DEADLINE_SECONDS".to_string(), "600".to_string());
        vars.insert("PENDING_TTL_SECONDS".to_string(), "120".to_string());
        vars.insert("EMPTY_ROOM_GRACE_SECONDS".to_string(), "30".to_string());
        vars.insert("OUTBOUND_SEND_DEADLINE_MS".to_string(), "250".to_string());
        vars.insert("DISPATCHER_QUEUE_DEPTH".to_string(), "64".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.blob_bucket, "rx-files");
        assert_eq!(config.blob_public_base_url, "https://cdn.example.com");
        assert_eq!(config.room.inactivity_deadline, Duration::from_secs(600));
        assert_eq!(config.room.pending_ttl, Duration::from_secs(120));
        assert_eq!(config.room.empty_room_grace, Duration::from_secs(30));
        assert_eq!(
            config.room.outbound_send_deadline,
            Duration::from_millis(250)
        );
        assert_eq!(config.room.dispatcher_queue_depth, 64);
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_missing_jwt_secret() {
        let mut vars = base_vars();
        vars.remove("JWT_SECRET");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "JWT_SECRET"));
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut vars = base_vars();
        vars.insert("JWT_SECRET".to_string(), "too-short".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwt(msg)) if msg.contains("at least 32 bytes"))
        );
    }

    #[test]
    fn test_jwt_clock_skew_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwt(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_jwt_clock_skew_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "-5".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwt(msg)) if msg.contains("must be positive"))
        );
    }

    #[test]
    fn test_room_setting_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("DISPATCHER_QUEUE_DEPTH".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name, reason })
                if name == "DISPATCHER_QUEUE_DEPTH" && reason.contains("greater than 0")
        ));
    }

    #[test]
    fn test_room_setting_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert(
            "INACTIVITY_DEADLINE_SECONDS".to_string(),
            "half-an-hour".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name, reason })
                if name == "INACTIVITY_DEADLINE_SECONDS" && reason.contains("valid positive integer")
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains(TEST_SECRET));
    }
}
