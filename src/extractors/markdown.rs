use crate::contracts::vector::sanitize_utf8;
use crate::errors::Result;

use super::ExtractedText;

/// Markdown is indexed as raw text (frontmatter included): stripping it
/// would misalign the chunk offsets the Chunker records against this text.
pub fn extract(bytes: &[u8]) -> Result<ExtractedText> {
    Ok(ExtractedText { text: sanitize_utf8(bytes), mime: "text/markdown".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_markdown_as_is() {
        let result = extract(b"# Title\n\nBody text.").unwrap();
        assert_eq!(result.text, "# Title\n\nBody text.");
        assert_eq!(result.mime, "text/markdown");
    }
}
