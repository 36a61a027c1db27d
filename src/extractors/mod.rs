// Document Extractors (spec.md §2): format-specific text extraction. Each
// extractor turns raw bytes into UTF-8 text plus a MIME type; the Indexer
// hashes the result and feeds it to the Chunker.
//
// Source-code language detection follows the teacher's
// `parsing/tree_sitter.rs::SupportedLanguage::from_extension` idiom
// (extension -> kind dispatch), generalized across all ten formats spec.md
// §2 names rather than just tree-sitter's supported grammars.

pub mod delimited;
pub mod markdown;
pub mod plain_text;
pub mod source_code;
pub mod structured_config;

#[cfg(feature = "office-extraction")]
pub mod office;
#[cfg(feature = "office-extraction")]
pub mod pdf;

use std::path::Path;

use crate::errors::{ConduitError, Result};

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub mime: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FormatKind {
    PlainText,
    Markdown,
    SourceCode,
    StructuredConfig,
    Delimited,
    Pdf,
    Office,
}

const SOURCE_CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp", "hpp", "cc", "cs", "rb", "php", "swift",
    "kt", "scala", "sh", "bash",
];
const STRUCTURED_CONFIG_EXTENSIONS: &[&str] = &["yaml", "yml", "toml", "json"];
const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv"];
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

pub(crate) fn classify(extension: &str) -> FormatKind {
    let ext = extension.to_lowercase();
    if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
        FormatKind::Markdown
    } else if SOURCE_CODE_EXTENSIONS.contains(&ext.as_str()) {
        FormatKind::SourceCode
    } else if STRUCTURED_CONFIG_EXTENSIONS.contains(&ext.as_str()) {
        FormatKind::StructuredConfig
    } else if DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        FormatKind::Delimited
    } else if ext == "pdf" {
        FormatKind::Pdf
    } else if ["doc", "docx", "rtf", "odt"].contains(&ext.as_str()) {
        FormatKind::Office
    } else {
        FormatKind::PlainText
    }
}

/// Dispatches to the format-specific extractor based on the file's
/// extension, falling back to plain text for anything unrecognized.
pub fn extract(path: &Path, bytes: &[u8]) -> Result<ExtractedText> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match classify(extension) {
        FormatKind::Markdown => markdown::extract(bytes),
        FormatKind::SourceCode => source_code::extract(bytes, extension),
        FormatKind::StructuredConfig => structured_config::extract(bytes, extension),
        FormatKind::Delimited => delimited::extract_with_extension(bytes, extension),
        FormatKind::PlainText => plain_text::extract(bytes),
        #[cfg(feature = "office-extraction")]
        FormatKind::Pdf => pdf::extract(bytes),
        #[cfg(not(feature = "office-extraction"))]
        FormatKind::Pdf => Err(ConduitError::ValidationError("PDF extraction requires the office-extraction feature".into())),
        #[cfg(feature = "office-extraction")]
        FormatKind::Office => office::extract(path, bytes),
        #[cfg(not(feature = "office-extraction"))]
        FormatKind::Office => {
            Err(ConduitError::ValidationError("office document extraction requires the office-extraction feature".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify("rs"), FormatKind::SourceCode);
        assert_eq!(classify("md"), FormatKind::Markdown);
        assert_eq!(classify("yaml"), FormatKind::StructuredConfig);
        assert_eq!(classify("csv"), FormatKind::Delimited);
        assert_eq!(classify("txt"), FormatKind::PlainText);
        assert_eq!(classify("PDF"), FormatKind::Pdf);
    }

    #[test]
    fn extract_dispatches_plain_text_for_unknown_extension() {
        let result = extract(Path::new("notes.xyz"), b"hello world").unwrap();
        assert_eq!(result.text, "hello world");
    }
}
