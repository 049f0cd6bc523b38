//! Error types for table operations
//!
//! Data-shape problems (failed parses, unmatched joins, gaps) are never
//! raised; they live in the column data as [`ErrorValue`](crate::ErrorValue)
//! sentinels. Only structural misuse surfaces here.

use thiserror::Error;

/// Result type for table operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for table operations
#[derive(Error, Debug)]
pub enum Error {
    /// A column slug was referenced that the table does not define
    #[error("Column slug doesn't exist on the table: {0}")]
    UnknownColumn(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Delimited text could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
