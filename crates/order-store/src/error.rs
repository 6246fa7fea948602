use common::{OrderId, Version};
use domain::{LookupError, RepositoryError};
use thiserror::Error;

/// Errors raised by the PostgreSQL store before they reach the domain.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order number violated the per-business unique constraint.
    #[error("Duplicate order number: {order_number}")]
    DuplicateOrderNumber { order_number: String },

    /// The row was updated by someone else since it was read.
    #[error("Version conflict for order {order_id}: expected {expected}")]
    VersionConflict { order_id: OrderId, expected: Version },

    /// The order does not exist within the business.
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: OrderId },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back into a domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A domain value does not fit its column.
    #[error("Value out of range for column {column}: {value}")]
    OutOfRange { column: &'static str, value: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            )
        )
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOrderNumber { order_number } => {
                RepositoryError::DuplicateOrderNumber { order_number }
            }
            StoreError::VersionConflict { order_id, expected } => {
                RepositoryError::VersionConflict { order_id, expected }
            }
            StoreError::OrderNotFound { order_id } => RepositoryError::NotFound { order_id },
            err if err.is_unavailable() => RepositoryError::Unavailable(err.to_string()),
            err => RepositoryError::backend(err),
        }
    }
}

impl From<StoreError> for LookupError {
    fn from(err: StoreError) -> Self {
        LookupError::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err: RepositoryError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, RepositoryError::Unavailable(_)));
    }

    #[test]
    fn test_conflict_keeps_its_meaning() {
        let order_id = OrderId::new();
        let err: RepositoryError = StoreError::VersionConflict {
            order_id,
            expected: Version::first(),
        }
        .into();
        assert!(matches!(
            err,
            RepositoryError::VersionConflict { order_id: id, .. } if id == order_id
        ));
    }

    #[test]
    fn test_decode_maps_to_backend() {
        let err: RepositoryError = StoreError::Decode("bad status".into()).into();
        assert!(matches!(err, RepositoryError::Backend(_)));
    }
}
