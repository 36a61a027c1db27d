// Structured config files (yaml/yml/toml/json) are indexed as their raw
// text: re-serializing would lose comments and key ordering that matter for
// snippet display, so this only assigns the format-appropriate MIME type.

use crate::contracts::vector::sanitize_utf8;
use crate::errors::Result;

use super::ExtractedText;

fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => "application/x-yaml",
        "toml" => "application/toml",
        "json" => "application/json",
        _ => "text/plain",
    }
}

pub fn extract(bytes: &[u8], extension: &str) -> Result<ExtractedText> {
    Ok(ExtractedText { text: sanitize_utf8(bytes), mime: mime_for_extension(extension).to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_extensions_to_mime() {
        assert_eq!(mime_for_extension("yml"), "application/x-yaml");
        assert_eq!(mime_for_extension("toml"), "application/toml");
        assert_eq!(mime_for_extension("json"), "application/json");
    }

    #[test]
    fn preserves_raw_text() {
        let result = extract(b"key: value\n", "yaml").unwrap();
        assert_eq!(result.text, "key: value\n");
    }
}
