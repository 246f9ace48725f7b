//! Unified error system for Mirror core
//!
//! A single error type shared across the engine. Violations and safety
//! signals are *not* errors: they travel as structured results on the
//! successful control-flow path. This enum covers structural failures only.

use serde::{Deserialize, Serialize};

/// Unified error type for all Mirror operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum MirrorError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the cryptographic failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure
        message: String,
    },

    /// Submitted previous_hash does not match the current stream tail
    #[error("Chain mismatch: {message}")]
    ChainMismatch {
        /// Expected and observed tail hashes
        message: String,
    },

    /// Non-genesis previous_hash submitted on an empty stream
    #[error("Genesis violation: {message}")]
    GenesisViolation {
        /// Description of the offending append
        message: String,
    },

    /// Event or envelope signature failed verification
    #[error("Signature invalid: {message}")]
    SignatureInvalid {
        /// Description of the failed verification
        message: String,
    },

    /// Request missed its deadline
    #[error("Deadline exceeded: {message}")]
    DeadlineExceeded {
        /// Stage or operation that observed the expiry
        message: String,
    },

    /// Sandbox execution failed
    #[error("Sandbox error ({kind}): {message}")]
    Sandbox {
        /// One of timeout, oom, signal, exit_nonzero, output_too_large, parse_error
        kind: String,
        /// Description of the failure
        message: String,
    },

    /// Certificate invalid/revoked, or actor is not a recognized guardian
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of the authorization failure
        message: String,
    },

    /// Proposal executed before reaching its approval threshold
    #[error("Threshold not met: {message}")]
    ThresholdNotMet {
        /// Tally description
        message: String,
    },

    /// Peer failed verification or is unreachable
    #[error("Peer error: {message}")]
    Peer {
        /// Description of the peer failure
        message: String,
    },

    /// Internal system error; always fails closed at the pipeline boundary
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl MirrorError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a chain mismatch error
    pub fn chain_mismatch(message: impl Into<String>) -> Self {
        Self::ChainMismatch {
            message: message.into(),
        }
    }

    /// Create a genesis violation error
    pub fn genesis_violation(message: impl Into<String>) -> Self {
        Self::GenesisViolation {
            message: message.into(),
        }
    }

    /// Create a signature invalid error
    pub fn signature_invalid(message: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            message: message.into(),
        }
    }

    /// Create a deadline exceeded error
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            message: message.into(),
        }
    }

    /// Create a sandbox error with a specific kind
    pub fn sandbox(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sandbox {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a threshold not met error
    pub fn threshold_not_met(message: impl Into<String>) -> Self {
        Self::ThresholdNotMet {
            message: message.into(),
        }
    }

    /// Create a peer error
    pub fn peer(message: impl Into<String>) -> Self {
        Self::Peer {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "invalid",
            Self::NotFound { .. } => "not_found",
            Self::Crypto { .. } => "crypto",
            Self::Serialization { .. } => "serialization",
            Self::Storage { .. } => "storage",
            Self::ChainMismatch { .. } => "chain_mismatch",
            Self::GenesisViolation { .. } => "genesis_violation",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Sandbox { .. } => "sandbox",
            Self::Unauthorized { .. } => "unauthorized",
            Self::ThresholdNotMet { .. } => "threshold_not_met",
            Self::Peer { .. } => "peer",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Standard Result type for Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::storage(err.to_string()),
        }
    }
}

impl From<uuid::Error> for MirrorError {
    fn from(err: uuid::Error) -> Self {
        Self::invalid(format!("UUID error: {}", err))
    }
}

impl From<hex::FromHexError> for MirrorError {
    fn from(err: hex::FromHexError) -> Self {
        Self::serialization(format!("Hex decoding error: {}", err))
    }
}

impl From<base64::DecodeError> for MirrorError {
    fn from(err: base64::DecodeError) -> Self {
        Self::serialization(format!("Base64 decoding error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_creation_and_display() {
        let err = MirrorError::invalid("bad request shape");
        assert!(matches!(err, MirrorError::Invalid { .. }));
        assert_eq!(err.to_string(), "Invalid: bad request shape");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing log");
        let err = MirrorError::from(io_err);
        assert!(matches!(err, MirrorError::NotFound { .. }));
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(MirrorError::chain_mismatch("x").category(), "chain_mismatch");
        assert_eq!(MirrorError::sandbox("timeout", "x").category(), "sandbox");
        assert_eq!(MirrorError::threshold_not_met("x").category(), "threshold_not_met");
    }
}
