// ============================================================================
// Order Pipeline Error Taxonomy
// ============================================================================
//
// Three outcomes matter to callers:
// - NotFound:  a well-defined "absent" result, never logged as an error
// - Duplicate: the header-table primary key rejected a redelivered uid;
//              retrying can never succeed, so the consumer must not requeue
// - Storage:   everything else from the database; assumed transient
//
// Decode and validation failures never leave the consumer, so they are not
// part of this taxonomy. Cache operations cannot fail by design.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("order {0} already exists")]
    Duplicate(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl OrderError {
    /// Whether redelivering the message that caused this error can ever help.
    /// This is the single policy point for the consumer's ack decision.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::Duplicate(_) => false,
            OrderError::NotFound => false,
            OrderError::Storage(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_is_not_retryable() {
        let err = OrderError::Duplicate("t-1".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn storage_errors_are_retryable() {
        let err = OrderError::Storage(sqlx::Error::PoolClosed);
        assert!(err.is_retryable());
    }
}
