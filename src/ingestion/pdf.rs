// PDF text extraction
// Pages are read in document order and failures on individual pages are skipped

use std::path::Path;

use lopdf::Document;
use tracing::{debug, warn};

use super::IngestionError;

/// Extract the text of every page of a PDF, in page order
#[inline]
pub fn extract_pages(path: &Path) -> Result<Vec<String>, IngestionError> {
    let document = Document::load(path).map_err(|e| IngestionError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let pages = document.get_pages();
    debug!("Extracting text from {} PDF pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => texts.push(text),
            Err(e) => warn!("Could not extract text from page {}: {}", page_number, e),
        }
    }

    Ok(texts)
}
