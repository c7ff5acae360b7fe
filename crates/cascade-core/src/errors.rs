//! Unified error type for the view-synchronization engine
//!
//! One enum covers the whole pipeline. Variants follow the failure taxonomy:
//! unsupported operations are fatal, source failures are retryable, stale
//! positional references are skipped during replay. Invariant violations
//! (negative reference counts, unbalanced update scopes) are debug assertions
//! and never surface here.

/// Unified error type for all cascade operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CascadeError {
    /// The operation is not supported anywhere in the pipeline (e.g. moves)
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Name of the rejected operation
        operation: String,
    },

    /// The external data source failed during synchronization
    #[error("Source error: {message}")]
    Source {
        /// Error message reported by the source
        message: String,
    },

    /// A positional reference no longer identifies an item
    #[error("Index {index} out of range for {operation} (len {len})")]
    IndexOutOfRange {
        /// The stale index
        index: usize,
        /// Length of the sequence at the time of the access
        len: usize,
        /// Operation that performed the access
        operation: &'static str,
    },

    /// Configuration could not be parsed or failed validation
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the invalid setting
        message: String,
    },

    /// A background refresh was requested without a Tokio runtime
    #[error("No Tokio runtime available for background refresh")]
    NoRuntime,

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl CascadeError {
    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a source failure error
    pub fn source_failure(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Create an index-out-of-range error
    pub fn index_out_of_range(index: usize, len: usize, operation: &'static str) -> Self {
        Self::IndexOutOfRange {
            index,
            len,
            operation,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable, unique code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unsupported { .. } => "unsupported",
            Self::Source { .. } => "source",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::NoRuntime => "no_runtime",
            Self::Internal { .. } => "internal",
        }
    }

    /// Fatal errors must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::InvalidConfig { .. })
    }

    /// Errors a later full refresh is expected to heal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::IndexOutOfRange { .. })
    }
}

/// Standard Result type for cascade operations
pub type Result<T> = std::result::Result<T, CascadeError>;

impl From<std::io::Error> for CascadeError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<toml::de::Error> for CascadeError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}
