//! Error types for data sources.

use std::sync::Arc;

use thiserror::Error;

/// Errors carried by a failed data source or returned by the helpers in
/// [`sources`](crate::source::sources).
///
/// The type is `Clone` because a single failure cause is read back by every
/// subscriber of the source that stored it.
#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    /// Producer reported a failure with a message.
    #[error("{0}")]
    Failure(String),

    /// Producer reported a failure with an underlying error.
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// Data source finished without producing a result.
    #[error("data source finished without a result")]
    NoResult,

    /// No supplier was able to provide a data source.
    #[error("no data source supplier available")]
    NoSupplier,

    /// A combinator was built from an empty supplier list.
    #[error("list of suppliers is empty")]
    EmptySuppliers,

    /// Timed out waiting for a final result.
    #[error("timed out waiting for final result")]
    Timeout,

    /// The data source went away before delivering an outcome.
    #[error("data source was dropped before finishing")]
    Dropped,
}

impl DataSourceError {
    /// Create a failure from a message.
    pub fn failure(message: impl Into<String>) -> Self {
        DataSourceError::Failure(message.into())
    }

    /// Wrap an arbitrary error as a failure cause.
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DataSourceError::Source(Arc::new(err))
    }

    /// Returns `true` if this is the timeout raised by
    /// [`wait_for_final_result`](crate::source::sources::wait_for_final_result).
    pub fn is_timeout(&self) -> bool {
        matches!(self, DataSourceError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_displays_message() {
        let err = DataSourceError::failure("decode failed");
        assert_eq!(err.to_string(), "decode failed");
    }

    #[test]
    fn source_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing blob");
        let err = DataSourceError::from_error(io);
        assert_eq!(err.to_string(), "missing blob");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn clones_share_the_underlying_error() {
        let io = std::io::Error::other("boom");
        let err = DataSourceError::from_error(io);
        let copy = err.clone();
        match (&err, &copy) {
            (DataSourceError::Source(a), DataSourceError::Source(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected Source variants"),
        }
    }

    #[test]
    fn only_timeout_is_timeout() {
        assert!(DataSourceError::Timeout.is_timeout());
        assert!(!DataSourceError::NoResult.is_timeout());
    }
}
