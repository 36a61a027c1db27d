// PDF text extraction via `pdf-extract`, grounded on the dependency choice
// in the document-ingestion manifests reviewed for this format (spec.md §2
// names PDF as a required format; the crate has no in-tree PDF parser).

use crate::errors::{ConduitError, Result};

use super::ExtractedText;

pub fn extract(bytes: &[u8]) -> Result<ExtractedText> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ConduitError::ValidationError(format!("failed to extract PDF text: {e}")))?;
    Ok(ExtractedText { text, mime: "application/pdf".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf_bytes() {
        assert!(extract(b"not a pdf").is_err());
    }
}
