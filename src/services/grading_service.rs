use crate::error::Result;
use crate::models::rubric::Rubric;
use crate::services::gemini_service::GeminiClient;
use crate::services::rag_service::RagService;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use uuid::Uuid;

const GRADING_PROMPT: &str = r#"
You are a strict but fair university professor grading a student's exam.

RUBRIC:
Question: {question_text}
Expected Answer: {expected_answer}
Keywords Required: {keywords}
Maximum Marks: {max_marks}

COURSE CONTEXT (from textbook/study materials):
{rag_context}

STUDENT'S ANSWER (from handwritten submission):
{student_answer}

GRADING INSTRUCTIONS:
1. Compare the student's answer to the expected answer
2. Check if required keywords/concepts are present
3. Use the course context to verify alternative phrasings
4. Partial marks are allowed based on the marking rubric
5. Be lenient with spelling errors if the concept is correct
6. Award method marks even if the final answer is wrong

OUTPUT FORMAT (JSON):
{
  "marks_awarded": <number>,
  "ai_reasoning": "Step-by-step explanation of how marks were awarded",
  "confidence_score": <0.0 to 1.0>,
  "feedback": "Constructive feedback for the student"
}
"#;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("number pattern is valid"));

const FALLBACK_PARSE_CONFIDENCE: f64 = 0.4;
const OFFLINE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
pub struct GradeResult {
    pub marks_awarded: f64,
    pub ai_reasoning: String,
    pub confidence_score: f64,
    pub feedback: String,
}

#[derive(Clone)]
pub struct GradingService {
    gemini: GeminiClient,
    rag: RagService,
}

impl GradingService {
    pub fn new(gemini: GeminiClient, rag: RagService) -> Self {
        Self { gemini, rag }
    }

    /// Grade one student answer against one rubric item, with retrieved
    /// course context folded into the prompt.
    pub async fn grade_answer(
        &self,
        course_id: Uuid,
        rubric: &Rubric,
        student_answer: &str,
    ) -> Result<GradeResult> {
        let query = rubric
            .question_text
            .as_deref()
            .unwrap_or(&rubric.expected_answer);
        let rag_context = self.rag.fetch_context(course_id, query).await;

        self.grade_with_context(rubric, student_answer, &rag_context)
            .await
    }

    /// Grading core, separated from retrieval so it can be exercised with
    /// a prepared context.
    pub async fn grade_with_context(
        &self,
        rubric: &Rubric,
        student_answer: &str,
        rag_context: &str,
    ) -> Result<GradeResult> {
        if !self.gemini.is_configured() {
            return Ok(offline_grade(rubric, student_answer));
        }

        let keywords = rubric.keyword_list().join(", ");
        let prompt = GRADING_PROMPT
            .replace("{question_text}", rubric.question_text.as_deref().unwrap_or(""))
            .replace("{expected_answer}", &rubric.expected_answer)
            .replace("{keywords}", &keywords)
            .replace("{max_marks}", &rubric.max_marks.to_string())
            .replace(
                "{rag_context}",
                if rag_context.is_empty() {
                    "No extra context available."
                } else {
                    rag_context
                },
            )
            .replace("{student_answer}", student_answer);

        let response = self
            .gemini
            .generate_content(self.gemini.generation_model(), &prompt)
            .await?;

        Ok(parse_grade_response(&response, rubric.max_marks_f64()))
    }
}

/// Parse the model's grading JSON. When the response is not valid
/// structured data, salvage the first number as the score (capped at the
/// item's maximum), mark the result low-confidence and keep the raw text
/// as reasoning so a reviewer can see what happened.
pub fn parse_grade_response(response: &str, max_marks: f64) -> GradeResult {
    let cleaned = crate::utils::json_recovery::strip_code_fences(response);
    if let Ok(parsed) = serde_json::from_str::<GradeResult>(&cleaned) {
        return parsed;
    }

    let numeric_score = NUMBER_PATTERN
        .find(response)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);

    GradeResult {
        marks_awarded: numeric_score.min(max_marks),
        ai_reasoning: response.to_string(),
        confidence_score: FALLBACK_PARSE_CONFIDENCE,
        feedback: "Auto-parsed score; please review.".to_string(),
    }
}

/// Deterministic credential-less heuristic: full marks when any keyword
/// appears (case-insensitive) or the answer is non-empty, zero otherwise.
pub fn offline_grade(rubric: &Rubric, student_answer: &str) -> GradeResult {
    let answer_lower = student_answer.to_lowercase();
    let contains_keyword = rubric
        .keyword_list()
        .iter()
        .any(|kw| answer_lower.contains(&kw.to_lowercase()))
        || !student_answer.is_empty();

    let score = if contains_keyword {
        rubric.max_marks_f64()
    } else {
        0.0
    };

    GradeResult {
        marks_awarded: score,
        ai_reasoning: "Local fallback grading used.".to_string(),
        confidence_score: OFFLINE_CONFIDENCE,
        feedback: if contains_keyword {
            "Looks correct.".to_string()
        } else {
            "No relevant content found.".to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn rubric_with(keywords: &[&str], max_marks: i64) -> Rubric {
        Rubric {
            id: Uuid::new_v4(),
            grader_id: Uuid::new_v4(),
            question_number: "1".to_string(),
            question_text: Some("Differentiate 2x^2".to_string()),
            expected_answer: "4x".to_string(),
            keywords: Some(serde_json::json!(keywords)),
            max_marks: Decimal::from(max_marks),
            order_index: 0,
            created_at: None,
        }
    }

    #[test]
    fn offline_keyword_match_awards_full_marks() {
        let result = offline_grade(&rubric_with(&["derivative"], 5), "the derivative is 4x");
        assert_eq!(result.marks_awarded, 5.0);
        assert_eq!(result.confidence_score, 0.5);
    }

    #[test]
    fn offline_empty_answer_scores_zero() {
        let result = offline_grade(&rubric_with(&["derivative"], 5), "");
        assert_eq!(result.marks_awarded, 0.0);
        assert_eq!(result.confidence_score, 0.5);
        assert_eq!(result.feedback, "No relevant content found.");
    }

    #[test]
    fn offline_nonempty_answer_without_keywords_still_scores() {
        // The lenient fallback rule: any non-empty answer earns the marks.
        let result = offline_grade(&rubric_with(&["derivative"], 5), "some unrelated words");
        assert_eq!(result.marks_awarded, 5.0);
    }

    #[test]
    fn parses_structured_grade_json() {
        let response = r#"{"marks_awarded": 3.5, "ai_reasoning": "method shown", "confidence_score": 0.9, "feedback": "good"}"#;
        let result = parse_grade_response(response, 5.0);
        assert_eq!(result.marks_awarded, 3.5);
        assert_eq!(result.confidence_score, 0.9);
    }

    #[test]
    fn unstructured_response_salvages_first_number() {
        let result = parse_grade_response("I would award 4 marks because the method is right", 5.0);
        assert_eq!(result.marks_awarded, 4.0);
        assert_eq!(result.confidence_score, 0.4);
        assert_eq!(result.feedback, "Auto-parsed score; please review.");
    }

    #[test]
    fn salvaged_score_is_capped_at_max_marks() {
        let result = parse_grade_response("Score: 12 out of 5", 5.0);
        assert_eq!(result.marks_awarded, 5.0);
    }

    #[test]
    fn numberless_response_scores_zero() {
        let result = parse_grade_response("no marks awarded here, sorry", 5.0);
        assert_eq!(result.marks_awarded, 0.0);
        assert_eq!(result.confidence_score, 0.4);
    }
}
