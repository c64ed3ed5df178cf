//! Error types for the fetch, store and shell layers

use thiserror::Error;

/// Failure talking to the market-data provider.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected {symbol}: {message}")]
    Provider { symbol: String, message: String },

    #[error("unreadable provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure in the local SQLite store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("no table in {path} matches the stock_prices schema")]
    SchemaMismatch { path: String },
}

/// Errors surfaced to the user at the action boundary.
///
/// The `Display` text is what the notice dialog shows.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Input(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0} stopped unexpectedly")]
    Worker(&'static str),
}

impl AppError {
    /// Dialog title for this error category
    pub fn title(&self) -> &'static str {
        match self {
            AppError::Input(_) => "Check input",
            AppError::Fetch(_) => "Fetch failed",
            AppError::Store(_) => "Database",
            AppError::Worker(_) => "Internal error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_is_reported_as_fetch_failed() {
        let err: AppError = FetchError::Provider {
            symbol: "ZZZZ".to_string(),
            message: "No data found, symbol may be delisted".to_string(),
        }
        .into();

        assert_eq!(err.title(), "Fetch failed");
        assert!(err.to_string().starts_with("Fetch failed: provider rejected ZZZZ"));
    }

    #[test]
    fn test_schema_mismatch_names_the_file() {
        let err: AppError = StoreError::SchemaMismatch { path: "other.db".to_string() }.into();
        assert_eq!(err.title(), "Database");
        assert!(err.to_string().contains("other.db"));
    }
}
