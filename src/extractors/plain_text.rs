use crate::contracts::vector::sanitize_utf8;
use crate::errors::Result;

use super::ExtractedText;

pub fn extract(bytes: &[u8]) -> Result<ExtractedText> {
    Ok(ExtractedText { text: sanitize_utf8(bytes), mime: "text/plain".to_string() })
}
