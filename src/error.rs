//! Error taxonomy for the ingestion and answering pipelines.
//!
//! Each external boundary (filesystem, embedding service, market data,
//! LLM) gets its own error enum so callers can match on exactly the
//! failures that boundary can produce. Ingestion errors are logged and
//! skipped; embedding dimension mismatches are fatal at startup; external
//! service errors trigger the synthesizer's fallback path and never
//! propagate out of `answer`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure while reading or extracting a source document.
///
/// These are per-file errors: a directory ingest logs them and moves on
/// to the next file rather than aborting the scan.
#[derive(Debug, Error)]
pub enum IngestError {
    /// File extension is not one of the supported formats (`.txt`, `.pdf`).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File could not be read or its content could not be extracted.
    #[error("failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    /// Extraction succeeded but produced no usable text.
    #[error("no text extracted from {0}")]
    EmptyDocument(PathBuf),
}

/// Failure while generating embedding vectors.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The embedding service could not be reached or kept failing after
    /// the configured number of retries.
    #[error("embedding service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A returned vector does not match the configured model output size.
    /// Detected by the startup probe and on every batch; never tolerated.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The service answered but returned fewer vectors than texts.
    #[error("embedding response missing vectors: expected {expected}, got {actual}")]
    ShortResponse { expected: usize, actual: usize },
}

/// Failure while fetching a market-data time series.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("market data request timed out after {0:?}")]
    Timeout(Duration),

    #[error("market data provider rate limited")]
    RateLimited,

    /// The provider answered but had no series for the symbol.
    #[error("no price data for symbol {0}")]
    NoData(String),

    #[error("market data request failed: {0}")]
    Http(String),
}

/// Failure while calling the language-model service.
///
/// Every variant routes the caller onto the deterministic fallback
/// template; none of these ever reach the query entry point.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM provider rate limited")]
    RateLimited,

    #[error("LLM request failed: {0}")]
    Http(String),

    /// No LLM provider is configured; synthesis always falls back.
    #[error("LLM provider is disabled")]
    Disabled,
}
