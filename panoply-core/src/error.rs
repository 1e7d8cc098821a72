//! Error types for the Panoply SDK.
//!
//! Every SDK failure is a [`PanoplyError`] carrying a stable code in its
//! message. Plugin errors that cross a configuration or collection entry
//! point are turned into [`NormalizedError`](crate::normalize::NormalizedError)
//! by the normalizer instead; the two are deliberately separate types.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | P1001-P1099 | Credentials | API key / secret decomposition |
//! | P2001-P2099 | Config | Configuration files, environment, runtime |
//! | P3001-P3099 | Transport | Queue endpoint and refresh endpoint HTTP errors |
//! | P4001-P4099 | Auth | Token refresh handshake failures |
//! | P5001-P5099 | Data | Record shaping and parameter validation |
//! | P9001-P9099 | General | Internal, IO and serialization errors |

use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to the computed delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Retry policy for calls to an OAuth refresh endpoint.
    pub fn for_token_refresh(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // up to 25% on top of the capped delay
            capped_delay * (1.0 + rand_jitter() * 0.25)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Returns a value between 0.0 and 1.0 derived from the clock.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// The main error type for the Panoply SDK.
#[derive(Debug, Error)]
pub enum PanoplyError {
    // ========================================================================
    // Credential Errors (P1001-P1099)
    // ========================================================================
    /// API key or secret does not have the expected shape
    #[error("[P1001] Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// API secret is not valid base64
    #[error("[P1002] Failed to decode API secret: {0}")]
    CredentialDecode(String),

    // ========================================================================
    // Configuration Errors (P2001-P2099)
    // ========================================================================
    /// Required configuration value is missing
    #[error("[P2001] Missing required configuration: {0}")]
    MissingConfig(String),

    /// Invalid configuration value
    #[error("[P2002] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    /// Configuration file parse error
    #[error("[P2003] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// No async runtime to host a background worker
    #[error("[P2004] Async runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    // ========================================================================
    // Transport Errors (P3001-P3099)
    // ========================================================================
    /// HTTP request could not be completed
    #[error("[P3001] Request failed: {0}")]
    RequestFailed(String),

    /// Remote service could not be reached
    #[error("[P3002] Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Request exceeded its timeout
    #[error("[P3003] Request timed out: {0}")]
    Timeout(String),

    /// Remote service asked us to slow down
    #[error("[P3004] Rate limit exceeded for {service}")]
    RateLimited { service: String },

    /// Response body could not be interpreted
    #[error("[P3005] Failed to parse response: {0}")]
    ResponseParse(String),

    /// Remote service answered with a non-success status
    #[error("[P3006] HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The uplink worker is gone and can no longer accept records
    #[error("[P3007] Uplink is closed")]
    UplinkClosed,

    // ========================================================================
    // Auth Errors (P4001-P4099)
    // ========================================================================
    /// Token refresh failed; the user has to re-authenticate
    #[error("[P4001] Token validation failed, re-authentication required: {message}")]
    TokenValidation {
        message: String,
        original_error: String,
    },

    /// Source config has no usable token under the given key
    #[error("[P4002] Missing token field '{0}' in source config")]
    MissingToken(String),

    /// Post-refresh callback returned an error or could not be resolved
    #[error("[P4003] Token callback '{callback}' failed: {message}")]
    CallbackFailed { callback: String, message: String },

    // ========================================================================
    // Data Errors (P5001-P5099)
    // ========================================================================
    /// Record shaping received a value of the wrong type or an empty value
    #[error("[P5001] {0}")]
    WrongTypeOrValue(String),

    /// Parameter validation failed
    #[error("[P5002] {0}")]
    IncorrectParam(String),

    // ========================================================================
    // General Errors (P9001-P9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[P9001] Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("[P9002] IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("[P9003] Serialization error: {0}")]
    SerializationError(String),
}

pub type PanoplyResult<T> = Result<T, PanoplyError>;

// ============================================================================
// From trait implementations
// ============================================================================

impl From<reqwest::Error> for PanoplyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PanoplyError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            // connection dropped or reset before a response arrived
            PanoplyError::ServiceUnavailable(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                PanoplyError::RateLimited {
                    service: err
                        .url()
                        .and_then(|u| u.host_str().map(|h| h.to_string()))
                        .unwrap_or_else(|| "unknown".to_string()),
                }
            } else {
                PanoplyError::HttpStatus {
                    status: status.as_u16(),
                    body: err.to_string(),
                }
            }
        } else if err.is_decode() {
            PanoplyError::ResponseParse(err.to_string())
        } else {
            PanoplyError::RequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PanoplyError {
    fn from(err: serde_json::Error) -> Self {
        PanoplyError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for PanoplyError {
    fn from(err: std::io::Error) -> Self {
        PanoplyError::IoError(err.to_string())
    }
}

impl From<base64::DecodeError> for PanoplyError {
    fn from(err: base64::DecodeError) -> Self {
        PanoplyError::CredentialDecode(err.to_string())
    }
}

impl From<config::ConfigError> for PanoplyError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => PanoplyError::MissingConfig(key),
            config::ConfigError::FileParse { uri, cause } => PanoplyError::ConfigParseError(
                format!("Failed to parse {}: {}", uri.unwrap_or_default(), cause),
            ),
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => PanoplyError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => PanoplyError::ConfigParseError(err.to_string()),
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl PanoplyError {
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            PanoplyError::RequestFailed(_)
                | PanoplyError::ServiceUnavailable(_)
                | PanoplyError::Timeout(_)
                | PanoplyError::RateLimited { .. }
                | PanoplyError::ResponseParse(_)
                | PanoplyError::HttpStatus { .. }
                | PanoplyError::UplinkClosed
        )
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            PanoplyError::TokenValidation { .. }
                | PanoplyError::MissingToken(_)
                | PanoplyError::CallbackFailed { .. }
        )
    }

    /// Transport failures worth repeating right away with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            PanoplyError::ServiceUnavailable(_)
            | PanoplyError::Timeout(_)
            | PanoplyError::RateLimited { .. } => true,
            PanoplyError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether a caller-level retry policy may run the failed operation again.
    ///
    /// Authentication and credential failures need user action, so they are
    /// never retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PanoplyError::TokenValidation { .. }
                | PanoplyError::MissingToken(_)
                | PanoplyError::CallbackFailed { .. }
                | PanoplyError::InvalidCredentials(_)
                | PanoplyError::CredentialDecode(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PanoplyError::InvalidCredentials(_) => "P1001",
            PanoplyError::CredentialDecode(_) => "P1002",
            PanoplyError::MissingConfig(_) => "P2001",
            PanoplyError::InvalidConfigValue { .. } => "P2002",
            PanoplyError::ConfigParseError(_) => "P2003",
            PanoplyError::RuntimeUnavailable(_) => "P2004",
            PanoplyError::RequestFailed(_) => "P3001",
            PanoplyError::ServiceUnavailable(_) => "P3002",
            PanoplyError::Timeout(_) => "P3003",
            PanoplyError::RateLimited { .. } => "P3004",
            PanoplyError::ResponseParse(_) => "P3005",
            PanoplyError::HttpStatus { .. } => "P3006",
            PanoplyError::UplinkClosed => "P3007",
            PanoplyError::TokenValidation { .. } => "P4001",
            PanoplyError::MissingToken(_) => "P4002",
            PanoplyError::CallbackFailed { .. } => "P4003",
            PanoplyError::WrongTypeOrValue(_) => "P5001",
            PanoplyError::IncorrectParam(_) => "P5002",
            PanoplyError::Internal(_) => "P9001",
            PanoplyError::IoError(_) => "P9002",
            PanoplyError::SerializationError(_) => "P9003",
        }
    }

    pub fn wrong_type_or_value(message: impl Into<String>) -> Self {
        PanoplyError::WrongTypeOrValue(message.into())
    }

    pub fn incorrect_param(message: impl Into<String>) -> Self {
        PanoplyError::IncorrectParam(message.into())
    }

    /// Log this error with a severity matching its transience.
    pub fn log(&self) {
        let code = self.error_code();

        if self.is_transient() {
            warn!(error_code = %code, "Transient error occurred: {}", self);
        } else {
            error!(error_code = %code, "Error occurred: {}", self);
        }
    }
}

// ============================================================================
// Retry utilities
// ============================================================================

/// Execute an async operation, retrying transient failures with backoff.
///
/// Non-transient errors are returned immediately.
pub async fn retry_async_with_config<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
) -> PanoplyResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = PanoplyResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        "Operation succeeded on attempt {} after {} retries",
                        attempt + 1,
                        attempt
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_transient() || attempt + 1 >= max_attempts {
                    e.log();
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_error_display() {
        let err = PanoplyError::InvalidCredentials("expected 4 parts".to_string());
        assert!(err.to_string().contains("P1001"));
        assert!(err.to_string().contains("expected 4 parts"));

        let err = PanoplyError::incorrect_param("Port should be in range [0: 65535]");
        assert!(err.to_string().ends_with("Port should be in range [0: 65535]"));
    }

    #[test]
    fn test_error_categorization() {
        let auth = PanoplyError::TokenValidation {
            message: "refresh failed".to_string(),
            original_error: "401".to_string(),
        };
        assert!(auth.is_auth_error());
        assert!(!auth.is_transport_error());

        let transport = PanoplyError::Timeout("30s".to_string());
        assert!(transport.is_transport_error());
        assert!(!transport.is_auth_error());
    }

    #[test]
    fn test_is_transient() {
        assert!(PanoplyError::Timeout("t".to_string()).is_transient());
        assert!(PanoplyError::ServiceUnavailable("down".to_string()).is_transient());
        assert!(PanoplyError::RateLimited {
            service: "api".to_string()
        }
        .is_transient());
        assert!(PanoplyError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_transient());

        assert!(!PanoplyError::HttpStatus {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!PanoplyError::wrong_type_or_value("bad").is_transient());
    }

    #[test]
    fn test_token_validation_is_not_retryable() {
        let err = PanoplyError::TokenValidation {
            message: "m".to_string(),
            original_error: "o".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(PanoplyError::Timeout("t".to_string()).is_retryable());
        assert!(PanoplyError::Internal("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(PanoplyError::UplinkClosed.error_code(), "P3007");
        assert_eq!(
            PanoplyError::MissingToken("refresh_token".to_string()).error_code(),
            "P4002"
        );
        assert_eq!(PanoplyError::wrong_type_or_value("x").error_code(), "P5001");
    }

    #[test]
    fn test_retry_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(3));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PanoplyError = json_err.into();
        assert!(matches!(err, PanoplyError::SerializationError(_)));
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_retry_stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: PanoplyResult<()> = retry_async_with_config(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PanoplyError::ServiceUnavailable("down".to_string()))
                }
            },
            &fast_retry(3),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: PanoplyResult<()> = retry_async_with_config(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PanoplyError::HttpStatus {
                        status: 400,
                        body: "bad request".to_string(),
                    })
                }
            },
            &fast_retry(3),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_async_with_config(
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(PanoplyError::Timeout("slow".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            },
            &fast_retry(3),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
