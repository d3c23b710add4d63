use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("failed to open document: {0}")]
    Open(String),
    #[error("failed to extract text: {0}")]
    Extraction(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Page-addressable text extraction: one string per page, in page order.
///
/// The primary scanning stage; the only stage that can report the page
/// indices a match occurred on.
pub trait PageExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractorError>;
}

/// Whole-document text extraction, used as the fallback stage.
///
/// Must be an independent implementation from the [`PageExtractor`] in use,
/// so that a file one library mishandles still gets a second chance.
pub trait DocExtractor: Send + Sync {
    fn extract_document(&self, path: &Path) -> Result<String, ExtractorError>;
}
