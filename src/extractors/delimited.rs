// CSV/TSV extraction: re-flows records into plain text ("col: value" lines
// per row, separated by blank lines) so the lexical and vector indices see
// readable prose rather than raw delimiter noise.

use crate::contracts::vector::sanitize_utf8;
use crate::errors::Result;

use super::ExtractedText;

fn delimiter_for(extension: &str) -> u8 {
    if extension.eq_ignore_ascii_case("tsv") {
        b'\t'
    } else {
        b','
    }
}

fn render_rows(bytes: &[u8], delimiter: u8) -> std::result::Result<String, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().delimiter(delimiter).flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut out = String::new();
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            let column = headers.get(i).unwrap_or("");
            out.push_str(column);
            out.push_str(": ");
            out.push_str(field);
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn extract(bytes: &[u8]) -> Result<ExtractedText> {
    extract_with_extension(bytes, "csv")
}

pub fn extract_with_extension(bytes: &[u8], extension: &str) -> Result<ExtractedText> {
    let delimiter = delimiter_for(extension);
    match render_rows(bytes, delimiter) {
        Ok(text) => Ok(ExtractedText { text, mime: "text/csv".to_string() }),
        Err(_) => Ok(ExtractedText { text: sanitize_utf8(bytes), mime: "text/plain".to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rows_as_column_value_lines() {
        let result = extract(b"name,age\nAda,36\n").unwrap();
        assert!(result.text.contains("name: Ada"));
        assert!(result.text.contains("age: 36"));
    }

    #[test]
    fn falls_back_to_plain_text_on_parse_failure() {
        let result = extract_with_extension(b"\"unterminated", "csv").unwrap();
        assert_eq!(result.mime, "text/plain");
    }

    #[test]
    fn tsv_uses_tab_delimiter() {
        let result = extract_with_extension(b"name\tage\nAda\t36\n", "tsv").unwrap();
        assert!(result.text.contains("name: Ada"));
    }
}
