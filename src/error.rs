//! Crate-level error type and error text sanitization
//!
//! Each concern keeps its own error enum next to the code that raises it;
//! `ServiceError` gathers them for the binary and for callers that only need
//! one error type.

use crate::calculator::CalculationError;
use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::protocol::ValidationError;
use crate::relay::RelayError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Server error: {message}")]
    Server { message: String },
}

impl ServiceError {
    /// Create server error
    pub fn server<S: Into<String>>(message: S) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Error text safe to write to logs or return to callers
    pub fn sanitized(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(password|token|key|secret)("?\s*[=:]\s*"?)[^\s",}]+"#)
        .expect("secret pattern is a valid regex")
});

/// Maximum length of a sanitized message
const MAX_MESSAGE_LEN: usize = 500;

/// Redact credential values and bound the length of error text
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}${2}***")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_secret_key_in_json_body() {
        let message = r#"Collaborator said: {"secret_key":"a1b2c3d4e5f6g7h8","order_id":1}"#;
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("a1b2c3d4e5f6g7h8"));
        assert!(sanitized.contains(r#""secret_key":"***"#));
        assert!(sanitized.contains("order_id"));
    }

    #[test]
    fn test_redacts_assignment_forms() {
        let message = "Auth failed: password=pass1 api_key: key123 token=tok456";
        let sanitized = sanitize_error_message(message);

        assert!(!sanitized.contains("pass1"));
        assert!(!sanitized.contains("key123"));
        assert!(!sanitized.contains("tok456"));
        assert!(sanitized.contains("password=***"));
    }

    #[test]
    fn test_sanitize_case_insensitive() {
        let sanitized = sanitize_error_message("SECRET=abc Token=xyz");
        assert!(!sanitized.contains("abc"));
        assert!(!sanitized.contains("xyz"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= MAX_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_exactly_max_length_is_kept() {
        let sanitized = sanitize_error_message(&"x".repeat(MAX_MESSAGE_LEN));
        assert_eq!(sanitized.len(), MAX_MESSAGE_LEN);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_service_error_wraps_relay_error() {
        let error: ServiceError = RelayError::Transport("connection refused".into()).into();
        assert_eq!(
            error.to_string(),
            "Relay error: Relay transport failure: connection refused"
        );
    }

    #[test]
    fn test_startup_errors_convert_with_question_mark() {
        fn load() -> ServiceResult<()> {
            let secret: Result<String, ConfigError> =
                Err(ConfigError::EnvVarNotFound("COLLABORATOR_SECRET_KEY".into()));
            secret?;
            Ok(())
        }

        let error = load().unwrap_err();
        assert!(matches!(error, ServiceError::Config(_)));
        assert_eq!(
            error.sanitized(),
            "Configuration error: Environment variable not found: COLLABORATOR_SECRET_KEY"
        );
    }

    #[test]
    fn test_service_error_sanitized() {
        let error = ServiceError::server("bind failed, secret=hunter2");
        assert_eq!(error.sanitized(), "Server error: bind failed, secret=***");
    }
}
