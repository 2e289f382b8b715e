//! Error types for the pooling, batching and analysis subsystem.

use thiserror::Error;

/// Result type alias for shim-perf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for shim-perf operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// TOML serialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Caller-supplied batch processor failed; the batch was requeued
    #[error("Batch processor failed ({batch_size} items requeued): {source}")]
    Processor {
        /// Number of items handed back to the queue
        batch_size: usize,
        /// Processor failure
        #[source]
        source: anyhow::Error,
    },

    /// DOM host error
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    /// Metrics measurement error
    #[error("Measurement error: {0}")]
    Measurement(String),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Context initialized twice
    #[error("Optimization context is already initialized")]
    AlreadyInitialized,

    /// Context used before initialize()
    #[error("Optimization context is not initialized")]
    NotInitialized,
}

/// DOM host errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// Node id does not exist in the document
    #[error("Node not found: {0}")]
    NodeNotFound(u64),

    /// The requested tree mutation is not allowed
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Selector did not match any element
    #[error("Selector not matched: {0}")]
    SelectorNotMatched(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processor_error_keeps_source() {
        let err = Error::Processor {
            batch_size: 3,
            source: anyhow::anyhow!("endpoint unavailable"),
        };

        assert!(err.to_string().contains("3 items requeued"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_dom_error_conversion() {
        let err: Error = DomError::SelectorNotMatched("#missing".to_string()).into();
        assert!(matches!(err, Error::Dom(DomError::SelectorNotMatched(_))));
    }
}
