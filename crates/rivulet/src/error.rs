//! Error types for the event store.

use rivulet_storage::StorageError;

/// Errors from event store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing storage engine failed.
    #[error("storage engine error: {0}")]
    Storage(#[from] StorageError),

    /// The event stream has been closed.
    #[error("event stream is closed")]
    StreamClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StoreError::StreamClosed.to_string(),
            "event stream is closed"
        );
        assert_eq!(
            StoreError::Storage(StorageError::Closed).to_string(),
            "storage engine error: storage engine is closed"
        );
    }

    #[test]
    fn test_from_storage_error() {
        let error: StoreError = StorageError::AppendFailed("boom".into()).into();
        assert!(matches!(error, StoreError::Storage(_)));
    }
}
