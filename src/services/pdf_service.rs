/// Best-effort conversion of uploaded bytes to plain text. Extraction is a
/// signal, not a correctness-critical step: every failure path returns an
/// empty string so callers treat missing text as "no content".
pub fn extract_text(bytes: &[u8], filename_hint: &str) -> String {
    let lower = filename_hint.to_lowercase();

    if lower.ends_with(".pdf") {
        return match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%filename_hint, %err, "PDF text extraction failed, returning empty text");
                String::new()
            }
        };
    }

    if lower.ends_with(".txt") || lower.ends_with(".md") {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    // Other document types get a lossy decode; no structured extraction.
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_text() {
        assert_eq!(extract_text(b"hello exam", "notes.txt"), "hello exam");
        assert_eq!(extract_text(b"# heading", "guide.md"), "# heading");
    }

    #[test]
    fn garbage_pdf_yields_empty_string() {
        let text = extract_text(b"definitely not a pdf", "scan.pdf");
        assert_eq!(text, "");
    }

    #[test]
    fn unknown_types_fall_back_to_lossy_decode() {
        let text = extract_text(b"csv,data,here", "marks.csv");
        assert_eq!(text, "csv,data,here");
    }
}
