//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key absent or expired.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Memcached-specific error
    #[cfg(feature = "memcached")]
    #[error("Memcached error: {0}")]
    Memcached(#[from] memcache::MemcacheError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Rejected key (empty or otherwise unusable)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Write refused by the store before taking effect
    #[error("Entry rejected: {0}")]
    Rejected(String),

    /// Operation the backing store cannot perform
    #[error("Operation not supported by {store} store: {operation}")]
    Unsupported {
        store: &'static str,
        operation: &'static str,
    },

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Some sub-steps of a multi-step operation failed.
    #[error("{operation} partially failed: {}", join_errors(.errors))]
    Partial {
        operation: &'static str,
        errors: Vec<CacheError>,
    },

    /// Generic error
    #[error("Cache error: {0}")]
    Other(String),
}

impl CacheError {
    /// Shorthand for the not-found error of `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Whether this error signals key absence rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error came from talking to the backend.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            #[cfg(feature = "redis")]
            Self::Redis(_) => true,
            #[cfg(feature = "memcached")]
            Self::Memcached(_) => true,
            _ => false,
        }
    }

    /// Whether this is a serialization or deserialization failure.
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Deserialization(_))
    }

    /// Collapse a list of sub-failures: `Ok` when empty, the single error when
    /// there is one, `Partial` otherwise.
    pub(crate) fn from_failures(operation: &'static str, mut errors: Vec<CacheError>) -> CacheResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Partial { operation, errors }),
        }
    }
}

fn join_errors(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinguished() {
        let err = CacheError::not_found("user:1");
        assert!(err.is_not_found());
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "Key not found: user:1");

        assert!(!CacheError::Timeout.is_not_found());
        assert!(!CacheError::Deserialization("bad".into()).is_not_found());
    }

    #[test]
    fn test_partial_display_lists_every_failure() {
        let err = CacheError::Partial {
            operation: "set",
            errors: vec![
                CacheError::Timeout,
                CacheError::Connection("refused".to_string()),
            ],
        };

        let display = err.to_string();
        assert!(display.starts_with("set partially failed"));
        assert!(display.contains("Operation timeout"));
        assert!(display.contains("refused"));
    }

    #[test]
    fn test_from_failures() {
        assert!(CacheError::from_failures("clear", vec![]).is_ok());

        let single = CacheError::from_failures("clear", vec![CacheError::Timeout]).unwrap_err();
        assert!(matches!(single, CacheError::Timeout));

        let many =
            CacheError::from_failures("clear", vec![CacheError::Timeout, CacheError::Timeout])
                .unwrap_err();
        assert!(matches!(many, CacheError::Partial { ref errors, .. } if errors.len() == 2));
    }

    #[test]
    fn test_unsupported_display() {
        let err = CacheError::Unsupported {
            store: "memcached",
            operation: "get_with_ttl",
        };
        assert_eq!(
            err.to_string(),
            "Operation not supported by memcached store: get_with_ttl"
        );
    }
}
