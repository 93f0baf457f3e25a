//! CLI error types and conversions

use crate::catalog::CatalogError;
use crate::downloader::{RateLimitError, RetrievalError};
use crate::fetcher::FetcherError;
use crate::identifier::IdentifierError;
use crate::output::OutputError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Identifier error
    #[error("identifier error: {0}")]
    IdentifierError(#[from] IdentifierError),

    /// Catalog error
    #[error("catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    /// Retrieval error
    #[error("retrieval error: {0}")]
    RetrievalError(#[from] RetrievalError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Rate limiter error
    #[error("rate limit error: {0}")]
    RateLimitError(#[from] RateLimitError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Interrupted before every chunk completed
    #[error("retrieval cancelled; partial results were written")]
    Cancelled,
}
