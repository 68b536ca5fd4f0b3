//! Text extraction for source documents (PDF, TXT).
//!
//! Extraction is per-file: the ingest loop calls [`extract_file`], logs any
//! error, and moves on. Extracted text is whitespace-normalized before it
//! reaches the chunker so that re-ingesting identical content always
//! produces identical chunk boundaries.

use std::path::Path;

use crate::error::IngestError;
use crate::models::DocumentFormat;

/// Extract normalized text from a file, dispatching on its extension.
///
/// Returns the detected format and the normalized text. Unrecognized
/// extensions fail with [`IngestError::UnsupportedFormat`]; unreadable or
/// corrupt files with [`IngestError::Io`]; files whose extraction yields
/// only whitespace with [`IngestError::EmptyDocument`].
pub fn extract_file(path: &Path) -> Result<(DocumentFormat, String), IngestError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let format = DocumentFormat::from_extension(&ext)
        .ok_or_else(|| IngestError::UnsupportedFormat(ext.clone()))?;

    let raw = match format {
        DocumentFormat::Txt => {
            let bytes = std::fs::read(path).map_err(|e| IngestError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        DocumentFormat::Pdf => pdf_extract::extract_text(path).map_err(|e| IngestError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
    };

    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Err(IngestError::EmptyDocument(path.to_path_buf()));
    }

    Ok((format, text))
}

/// Collapse all whitespace runs to single spaces and trim.
///
/// PDF extraction in particular produces erratic line breaks and padding;
/// normalizing here keeps chunk offsets stable across re-ingestion.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive a document title from the file name, without extension.
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}
