use serde::Deserialize;
use validator::Validate;

/// One rubric row as submitted through the manual-edit endpoint. The
/// whole rubric is replaced at once; order comes from array position.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RubricItemPayload {
    #[validate(length(min = 1))]
    pub question_number: String,
    pub question_text: Option<String>,
    pub expected_answer: String,
    pub keywords: Option<Vec<String>>,
    #[validate(range(min = 0.0))]
    pub max_marks: f64,
}
