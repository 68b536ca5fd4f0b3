//! Core data models used throughout finq.
//!
//! These types represent the documents, chunks, market series, and answers
//! that flow through the ingestion and answering pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Source file format accepted by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentFormat {
    Pdf,
    Txt,
}

impl DocumentFormat {
    /// Map a lowercased file extension to a format, `None` if unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(DocumentFormat::Pdf),
            "txt" => Some(DocumentFormat::Txt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Txt => "txt",
        }
    }
}

/// An ingested document. One per source file; removed on eviction or
/// explicit deletion.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub source_path: PathBuf,
    pub format: DocumentFormat,
    /// Extracted, whitespace-normalized text.
    pub raw_text: String,
    pub title: String,
    pub ingested_at: DateTime<Utc>,
    /// Monotonic ingestion counter; lowest value is evicted first.
    pub seq: u64,
}

/// A bounded slice of a document's normalized text, the unit of retrieval.
///
/// Offsets are byte offsets into the document's `raw_text`. Consecutive
/// chunks share the configured overlap; start and end offsets are each
/// strictly increasing within a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Fixed-dimensionality embedding, filled in after the embed step.
    pub embedding: Vec<f32>,
}

/// One day of OHLCV market data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Direction of a price series, judged from moving averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Up,
    Down,
    Sideways,
    /// Too few bars to compute the moving averages.
    InsufficientData,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "uptrend",
            Trend::Down => "downtrend",
            Trend::Sideways => "sideways",
            Trend::InsufficientData => "insufficient data",
        }
    }
}

/// Summary statistics derived locally from a fetched price series.
#[derive(Debug, Clone, Serialize)]
pub struct StockSummary {
    pub symbol: String,
    pub period: String,
    pub latest_close: f64,
    pub change: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub avg_volume: u64,
    /// Standard deviation of daily percent returns.
    pub volatility_pct: f64,
    pub trend: Trend,
    pub trading_days: usize,
}

/// Where a cited source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceOrigin {
    Document,
    Market,
}

/// Provenance entry attached to an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub label: String,
    pub origin: SourceOrigin,
}

/// The answer returned by the query entry point.
///
/// Always present: when the LLM service fails, `text` holds the templated
/// fallback and `used_fallback` is set.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub chart_data: Option<Vec<PriceBar>>,
    pub used_fallback: bool,
}
