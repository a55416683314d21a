//! Error taxonomy for the build pipeline
//!
//! Errors carry enough structure for metrics labels and HTTP status
//! mapping without leaking internal detail to callers. Telemetry
//! failures never appear here: they are absorbed as degraded freshness
//! inside the telemetry cache.

use thiserror::Error;

/// Unrecoverable conditions of one build request
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Malformed caller input: bad address, non-positive amount, unknown
    /// network. Never retried.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The funding address has nothing to spend; the caller must fund it
    #[error("No spendable outputs for address {address}")]
    NoSpendableOutputs { address: String },

    /// The UTXO indexer could not be reached or answered unusably
    #[error("Indexer unavailable: {0}")]
    IndexerUnavailable(String),

    /// Both the policy-optimal and the all-inputs construction attempts
    /// failed; both messages are preserved for diagnosis
    #[error("Construction failed: primary={primary}, fallback={}", .fallback.as_deref().unwrap_or("none"))]
    ConstructionFailed { primary: String, fallback: Option<String> },

    /// Invariant violation; indicates a bug rather than caller error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BuildError {
    /// Category label for metrics and structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NoSpendableOutputs { .. } => "no_spendable_outputs",
            Self::IndexerUnavailable(_) => "indexer_unavailable",
            Self::ConstructionFailed { .. } => "construction_failed",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller may retry the whole build unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidRequest(_) => false,
            Self::NoSpendableOutputs { .. } => false,
            Self::IndexerUnavailable(_) => true,
            Self::ConstructionFailed { .. } => true,
            Self::Internal(_) => false,
        }
    }

    /// HTTP status for the service boundary: 4xx for caller-fixable
    /// conditions, 5xx for backend failures
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NoSpendableOutputs { .. } => 400,
            Self::IndexerUnavailable(_) => 502,
            Self::ConstructionFailed { .. } => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Invalid-request error for a rejected payment output
    pub fn invalid_output(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRequest(format!("output[{index}]: {}", reason.into()))
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuildError::NoSpendableOutputs { address: "kaspa:qqtest".to_string() };
        assert_eq!(err.to_string(), "No spendable outputs for address kaspa:qqtest");

        let err = BuildError::ConstructionFailed {
            primary: "insufficient funds".to_string(),
            fallback: Some("mass exceeded".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Construction failed: primary=insufficient funds, fallback=mass exceeded"
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(BuildError::IndexerUnavailable("timeout".to_string()).is_retryable());
        assert!(BuildError::ConstructionFailed { primary: "x".to_string(), fallback: None }
            .is_retryable());

        assert!(!BuildError::InvalidRequest("bad".to_string()).is_retryable());
        assert!(!BuildError::NoSpendableOutputs { address: "a".to_string() }.is_retryable());
    }

    #[test]
    fn test_status_mapping_separates_caller_and_backend_faults() {
        assert_eq!(BuildError::InvalidRequest("x".to_string()).http_status(), 400);
        assert_eq!(BuildError::NoSpendableOutputs { address: "a".to_string() }.http_status(), 400);
        assert_eq!(BuildError::IndexerUnavailable("x".to_string()).http_status(), 502);
        assert_eq!(
            BuildError::ConstructionFailed { primary: "x".to_string(), fallback: None }.http_status(),
            500
        );
    }

    #[test]
    fn test_invalid_output_constructor_names_the_entry() {
        let err = BuildError::invalid_output(3, "amount must be positive");
        assert_eq!(err.to_string(), "Invalid request: output[3]: amount must be positive");
        assert_eq!(err.category(), "invalid_request");
    }
}
