use thiserror::Error;

/// Enrichment error types
///
/// Errors are `Clone` because a failure raised on the secondary exchange is
/// copied onto the original exchange's exception slot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrichError {
    /// Endpoint URI could not be resolved to an endpoint
    #[error("Failed to resolve endpoint '{uri}': {message}")]
    Resolution { uri: String, message: String },

    /// Dynamic endpoint expression failed or evaluated to nothing
    #[error("Invalid endpoint expression: {0}")]
    Expression(String),

    /// Secondary producer failed while sending
    #[error("Transport error ({endpoint}): {message}")]
    Transport { endpoint: String, message: String },

    /// Polling consumer failed while receiving
    #[error("Error during poll ({endpoint}): {message}")]
    Poll { endpoint: String, message: String },

    /// Aggregation strategy failed
    #[error("Error occurred during aggregation: {0}")]
    Aggregation(String),

    /// A processor rejected the exchange
    #[error("{0}")]
    Processing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Producer/consumer lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EnrichError {
    /// Shorthand for a processor failure carrying a plain message
    pub fn processing(message: impl Into<String>) -> Self {
        EnrichError::Processing(message.into())
    }

    /// Shorthand for a resolution failure
    pub fn resolution(uri: impl Into<String>, message: impl Into<String>) -> Self {
        EnrichError::Resolution {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            EnrichError::Resolution { .. } => "RESOLUTION_ERROR",
            EnrichError::Expression(_) => "EXPRESSION_ERROR",
            EnrichError::Transport { .. } => "TRANSPORT_ERROR",
            EnrichError::Poll { .. } => "POLL_ERROR",
            EnrichError::Aggregation(_) => "AGGREGATION_ERROR",
            EnrichError::Processing(_) => "PROCESSING_ERROR",
            EnrichError::Configuration(_) => "CONFIGURATION_ERROR",
            EnrichError::Lifecycle(_) => "LIFECYCLE_ERROR",
            EnrichError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure is transient.
    ///
    /// Informational only: the enrich step never retries, the hosting
    /// pipeline's error handler decides about redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrichError::Transport { .. } | EnrichError::Poll { .. }
        )
    }

    /// Whether the error means the endpoint itself is unusable, which is the
    /// class of failure `ignore_invalid_endpoint` masks.
    pub fn is_invalid_endpoint(&self) -> bool {
        matches!(
            self,
            EnrichError::Resolution { .. } | EnrichError::Expression(_)
        )
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for EnrichError {
    fn from(err: config::ConfigError) -> Self {
        EnrichError::Configuration(err.to_string())
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for EnrichError {
    fn from(err: serde_json::Error) -> Self {
        EnrichError::Internal(format!("Serialization error: {}", err))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EnrichError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EnrichError::resolution("bogus:x", "unknown scheme").error_code(),
            "RESOLUTION_ERROR"
        );
        assert_eq!(
            EnrichError::Aggregation("boom".to_string()).error_code(),
            "AGGREGATION_ERROR"
        );
        assert_eq!(EnrichError::processing("x").error_code(), "PROCESSING_ERROR");
    }

    #[test]
    fn test_processing_error_displays_bare_message() {
        let err = EnrichError::processing("I cannot do this");
        assert_eq!(err.to_string(), "I cannot do this");
    }

    #[test]
    fn test_retryable_and_invalid_endpoint() {
        let transport = EnrichError::Transport {
            endpoint: "direct:a".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(transport.is_retryable());
        assert!(!transport.is_invalid_endpoint());

        let resolution = EnrichError::resolution("nope:a", "unknown");
        assert!(!resolution.is_retryable());
        assert!(resolution.is_invalid_endpoint());
        assert!(EnrichError::Expression("empty".to_string()).is_invalid_endpoint());
    }
}
