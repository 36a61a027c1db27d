// Source-code text extraction. Unlike the teacher's `parsing/tree_sitter.rs`
// this never builds a symbol table — document extraction only needs the raw
// UTF-8 text and a MIME type; structural boundaries are the Chunker's
// concern (optionally via tree-sitter, behind `tree-sitter-chunking`).

use crate::contracts::vector::sanitize_utf8;
use crate::errors::Result;

use super::ExtractedText;

fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "rs" => "text/x-rust",
        "py" => "text/x-python",
        "js" | "jsx" => "text/javascript",
        "ts" | "tsx" => "text/x-typescript",
        "go" => "text/x-go",
        "java" => "text/x-java",
        "c" | "h" => "text/x-c",
        "cpp" | "hpp" | "cc" => "text/x-c++",
        "cs" => "text/x-csharp",
        "rb" => "text/x-ruby",
        "php" => "text/x-php",
        "swift" => "text/x-swift",
        "kt" => "text/x-kotlin",
        "scala" => "text/x-scala",
        "sh" | "bash" => "text/x-shellscript",
        _ => "text/plain",
    }
}

pub fn extract(bytes: &[u8], extension: &str) -> Result<ExtractedText> {
    Ok(ExtractedText { text: sanitize_utf8(bytes), mime: mime_for_extension(extension).to_string() })
}
