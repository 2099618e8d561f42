// shelfbase-core/src/error.rs
//! Error taxonomy shared by the store, the catalog service and the reports

use thiserror::Error;

/// Result alias used throughout shelfbase-core
pub type Result<T> = std::result::Result<T, ShelfError>;

#[derive(Error, Debug)]
pub enum ShelfError {
    /// The store connection is closed or could not be established
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A caller-supplied value violates a stated constraint.
    /// Always raised before any store call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A title-keyed write matched more than one record
    #[error("Ambiguous match: {matches} records share the title '{title}'")]
    AmbiguousMatch { title: String, matches: u64 },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Aggregation error: {0}")]
    AggregationError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ShelfError {
    fn from(err: serde_json::Error) -> Self {
        ShelfError::Serialization(err.to_string())
    }
}

impl ShelfError {
    /// True for failures caused by the connection rather than the request
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ShelfError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_match_message() {
        let err = ShelfError::AmbiguousMatch {
            title: "Dune".to_string(),
            matches: 2,
        };
        assert_eq!(
            err.to_string(),
            "Ambiguous match: 2 records share the title 'Dune'"
        );
    }

    #[test]
    fn test_serde_error_converts() {
        let err: ShelfError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ShelfError::Serialization(_)));
        assert!(!err.is_unavailable());
    }
}
