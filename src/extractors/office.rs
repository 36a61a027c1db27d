// Office document extraction (DOCX/ODT/RTF/legacy DOC), grounded on the
// same document-ingestion manifest as `pdf.rs`: DOCX and ODT are both
// zip-of-XML containers (`docx-rs` / raw `zip` + string scraping), RTF and
// legacy DOC get a best-effort control-word strip since neither format has
// a mature pure-Rust parser in the pack.

use std::io::Read;
use std::path::Path;

use crate::errors::{ConduitError, Result};

use super::ExtractedText;

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| ConduitError::ValidationError(format!("failed to parse DOCX: {e:?}")))?;
    let mut text = String::new();
    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            for run_child in &paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = run_child {
                    for run_content in &run.children {
                        if let docx_rs::RunChild::Text(t) = run_content {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }
    Ok(text)
}

/// ODT stores its body as `content.xml` inside a zip container; this keeps
/// only the text between tags, which is sufficient for indexing.
fn extract_odt(bytes: &[u8]) -> Result<String> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| ConduitError::ValidationError(format!("failed to open ODT archive: {e}")))?;
    let mut content = archive
        .by_name("content.xml")
        .map_err(|e| ConduitError::ValidationError(format!("ODT missing content.xml: {e}")))?;
    let mut xml = String::new();
    content
        .read_to_string(&mut xml)
        .map_err(|e| ConduitError::ValidationError(format!("failed to read ODT content.xml: {e}")))?;
    Ok(strip_tags(&xml))
}

fn strip_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Legacy binary DOC and RTF have no pure-Rust parser in the pack; this
/// strips RTF control words and non-ASCII binary noise to recover readable
/// prose well enough for indexing, not faithful reconstruction.
fn extract_lossy(bytes: &[u8]) -> String {
    let raw = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            while matches!(chars.peek(), Some(c) if c.is_ascii_alphanumeric()) {
                chars.next();
            }
            continue;
        }
        if c.is_control() && c != '\n' && c != '\t' {
            continue;
        }
        out.push(c);
    }
    out
}

pub fn extract(path: &Path, bytes: &[u8]) -> Result<ExtractedText> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    match extension.as_str() {
        "docx" => Ok(ExtractedText {
            text: extract_docx(bytes)?,
            mime: "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
        }),
        "odt" => Ok(ExtractedText { text: extract_odt(bytes)?, mime: "application/vnd.oasis.opendocument.text".to_string() }),
        "rtf" => Ok(ExtractedText { text: extract_lossy(bytes), mime: "application/rtf".to_string() }),
        _ => Ok(ExtractedText { text: extract_lossy(bytes), mime: "application/msword".to_string() }),
    }
}
