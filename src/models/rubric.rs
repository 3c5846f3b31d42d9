use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One gradable unit of a grader's rubric. `order_index` is unique and
/// contiguous within a grader and defines grading order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rubric {
    pub id: Uuid,
    pub grader_id: Uuid,
    pub question_number: String,
    pub question_text: Option<String>,
    pub expected_answer: String,
    pub keywords: Option<serde_json::Value>,
    pub max_marks: Decimal,
    pub order_index: i32,
    pub created_at: Option<DateTime<Utc>>,
}

impl Rubric {
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .as_ref()
            .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn max_marks_f64(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.max_marks.to_f64().unwrap_or(0.0)
    }
}

/// Rubric shape produced by extraction, before it is persisted with a
/// grader id and order index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricDraft {
    pub question_number: String,
    #[serde(default)]
    pub question_text: Option<String>,
    pub expected_answer: String,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub max_marks: f64,
}
