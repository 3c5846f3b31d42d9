use crate::services::gemini_service::GeminiClient;
use crate::services::pdf_service;
use crate::utils::json_recovery;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

const OCR_INSTRUCTIONS: &str = r#"You are an expert at reading handwritten exam papers. Extract ALL handwritten text from this exam paper.

IMPORTANT INSTRUCTIONS:
1. Identify question numbers (e.g., "1", "1.a", "2.b", "Q1", etc.) and their corresponding answers
2. Preserve mathematical notation using plain text or LaTeX where appropriate
3. Handle poor handwriting with best-effort transcription
4. Ignore metadata like student names, dates, or headers unless they are part of question answers
5. Return your response as a JSON object with this exact structure:
{
  "answers": {
    "1": "Student's answer to question 1",
    "1.a": "Student's answer to question 1.a",
    "2": "Student's answer to question 2"
  },
  "raw_text": "Complete transcription of all text found in the document"
}

If you cannot identify clear question numbers, put all text under a single "1" key.
Return ONLY the JSON object, no additional text."#;

static QUESTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Question\s*|Q\.?\s*)?(\d+(?:\.\d+)*(?:\.?[a-z])?)[:.)]\s*")
        .expect("question pattern is valid")
});

/// Per-question transcription plus the full raw transcript.
#[derive(Debug, Clone, Default)]
pub struct ExtractedAnswers {
    pub answers: HashMap<String, String>,
    pub raw_text: String,
}

#[derive(Clone)]
pub struct OcrService {
    gemini: GeminiClient,
}

impl OcrService {
    pub fn new(gemini: GeminiClient) -> Self {
        Self { gemini }
    }

    /// Transcribe a scanned submission into per-question answers. This
    /// never fails: every model or parse error steps down to the next
    /// strategy, bottoming out at `{answers: {}, raw_text: ""}`.
    pub async fn extract_answers(&self, pdf_bytes: &[u8]) -> ExtractedAnswers {
        if !self.gemini.is_configured() {
            tracing::warn!("no model credentials, falling back to local PDF text extraction");
            return self.fallback_local_parse(pdf_bytes);
        }

        // Preferred path: transient file upload, so large scans avoid the
        // inline-bytes request limit.
        match self.extract_via_file_upload(pdf_bytes).await {
            Ok(Some(extracted)) => return extracted,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, "file-upload OCR path failed, trying inline vision request");
            }
        }

        match self
            .gemini
            .generate_with_inline_pdf(OCR_INSTRUCTIONS, pdf_bytes)
            .await
        {
            Ok(response_text) => parse_ocr_response(&response_text),
            Err(err) => {
                tracing::error!(%err, "vision OCR request failed, falling back to local extraction");
                self.fallback_local_parse(pdf_bytes)
            }
        }
    }

    async fn extract_via_file_upload(
        &self,
        pdf_bytes: &[u8],
    ) -> crate::error::Result<Option<ExtractedAnswers>> {
        let uploaded = self
            .gemini
            .upload_file(pdf_bytes.to_vec(), "application/pdf", "submission")
            .await?;

        let result = self
            .gemini
            .generate_with_file(OCR_INSTRUCTIONS, &uploaded.uri, "application/pdf")
            .await;

        // The file is transient either way; best-effort cleanup.
        if !uploaded.name.is_empty() {
            let _ = self.gemini.delete_file(&uploaded.name).await;
        }

        let response_text = result?;
        if response_text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(parse_ocr_response(&response_text)))
    }

    fn fallback_local_parse(&self, pdf_bytes: &[u8]) -> ExtractedAnswers {
        let raw_text = pdf_service::extract_text(pdf_bytes, "submission.pdf");
        let answers = extract_answers_from_text(&raw_text);
        ExtractedAnswers { answers, raw_text }
    }
}

/// Interpret a model response: structured JSON when possible, question
/// segmentation over the raw text otherwise.
fn parse_ocr_response(response_text: &str) -> ExtractedAnswers {
    if let Some(value) = json_recovery::recover_json(response_text) {
        let answers = value
            .get("answers")
            .and_then(|a| a.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();
        let raw_text = value
            .get("raw_text")
            .and_then(|t| t.as_str())
            .unwrap_or(response_text)
            .to_string();
        return ExtractedAnswers { answers, raw_text };
    }

    tracing::warn!("OCR response was not recoverable JSON, segmenting raw text");
    ExtractedAnswers {
        answers: extract_answers_from_text(response_text),
        raw_text: response_text.to_string(),
    }
}

/// Segment free text into question-number → answer pairs using the marker
/// pattern ("1.", "1.a)", "Q1:", "Question 1:" ...). No markers means the
/// whole text becomes answer "1"; empty text means no answers.
pub fn extract_answers_from_text(text: &str) -> HashMap<String, String> {
    let mut answers = HashMap::new();
    let matches: Vec<_> = QUESTION_PATTERN.captures_iter(text).collect();

    if matches.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            answers.insert("1".to_string(), trimmed.to_string());
        }
        return answers;
    }

    for (i, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).expect("capture 0 always present");
        let question_num = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let start = whole.end();
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let answer_text = text[start..end].trim();
        if !answer_text.is_empty() {
            answers.insert(question_num, answer_text.to_string());
        }
    }

    answers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_q_prefixed_answers() {
        let answers = extract_answers_from_text("Q1: answer one Q2: answer two");
        assert_eq!(answers.get("1").map(String::as_str), Some("answer one"));
        assert_eq!(answers.get("2").map(String::as_str), Some("answer two"));
        assert_eq!(answers.len(), 2);
    }

    #[test]
    fn segments_question_word_and_subparts() {
        let text = "Question 1: the mitochondria 1.a) powerhouse of the cell 2. osmosis";
        let answers = extract_answers_from_text(text);
        assert_eq!(
            answers.get("1").map(String::as_str),
            Some("the mitochondria")
        );
        assert_eq!(
            answers.get("1.a").map(String::as_str),
            Some("powerhouse of the cell")
        );
        assert_eq!(answers.get("2").map(String::as_str), Some("osmosis"));
    }

    #[test]
    fn unmarked_text_becomes_single_answer() {
        let answers = extract_answers_from_text("just an essay with no numbering");
        assert_eq!(answers.len(), 1);
        assert_eq!(
            answers.get("1").map(String::as_str),
            Some("just an essay with no numbering")
        );
    }

    #[test]
    fn empty_text_yields_no_answers() {
        assert!(extract_answers_from_text("").is_empty());
        assert!(extract_answers_from_text("   \n ").is_empty());
    }

    #[test]
    fn parses_structured_ocr_json() {
        let response = "```json\n{\"answers\": {\"1\": \"4x\"}, \"raw_text\": \"1: 4x\"}\n```";
        let extracted = parse_ocr_response(response);
        assert_eq!(extracted.answers.get("1").map(String::as_str), Some("4x"));
        assert_eq!(extracted.raw_text, "1: 4x");
    }

    #[test]
    fn broken_json_falls_back_to_segmentation() {
        let response = "Sure! Q1: first part Q2: second part";
        let extracted = parse_ocr_response(response);
        assert_eq!(
            extracted.answers.get("2").map(String::as_str),
            Some("second part")
        );
        assert_eq!(extracted.raw_text, response);
    }

    #[tokio::test]
    async fn offline_extraction_never_fails() {
        let ocr = OcrService::new(GeminiClient::new(
            None,
            reqwest::Client::new(),
            "gemini-pro".into(),
            "text-embedding-004".into(),
        ));
        let extracted = ocr.extract_answers(b"not a real pdf").await;
        assert!(extracted.answers.is_empty());
        assert_eq!(extracted.raw_text, "");
    }
}
