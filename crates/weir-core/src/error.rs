//! Shared error type across weir crates.

use thiserror::Error;

use crate::errcode::CodedError;

/// Shared result type.
pub type Result<T> = std::result::Result<T, WeirError>;

/// Unified error type used by core and proxy.
#[derive(Debug, Error)]
pub enum WeirError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),
    #[error("invalid metric: {0}")]
    InvalidMetric(String),
    /// Structured error raised by the SQL layer. Kept as `source()` so the
    /// classifier reaches the coded root.
    #[error("execute failed")]
    Coded(#[from] CodedError),
    #[error("internal: {0}")]
    Internal(String),
}

impl WeirError {
    /// Whether the error comes from a caller contract violation at metric
    /// definition time (duplicate name, bad label schema, bad buckets).
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            WeirError::AlreadyRegistered(_) | WeirError::InvalidMetric(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::errcode::ErrorClass;

    #[test]
    fn coded_variant_exposes_source() {
        let err = WeirError::from(CodedError::new(ErrorClass::Executor, 1105, "boom"));
        let src = err.source().map(|s| s.to_string());
        assert_eq!(src.as_deref(), Some("[executor:1105]boom"));
    }

    #[test]
    fn definition_errors() {
        assert!(WeirError::AlreadyRegistered("x".into()).is_definition_error());
        assert!(WeirError::InvalidMetric("x".into()).is_definition_error());
        assert!(!WeirError::Internal("x".into()).is_definition_error());
    }
}
