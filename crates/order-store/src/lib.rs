//! PostgreSQL implementations of the order repository and collaborator
//! lookups.

pub mod directory;
pub mod error;
pub mod postgres;

pub use directory::PostgresDirectory;
pub use error::{Result, StoreError};
pub use postgres::PostgresOrderRepository;
