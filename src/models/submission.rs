use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub grader_id: Uuid,
    pub student_identifier: String,
    pub file_path: String,
    pub status: String,
    pub total_score: Option<Decimal>,
    pub max_possible_score: Option<Decimal>,
    pub percentage: Option<Decimal>,
    pub feedback_summary: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubmissionGrade {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub rubric_id: Uuid,
    pub marks_awarded: Decimal,
    pub ai_reasoning: Option<String>,
    pub confidence_score: Option<f64>,
    pub feedback: Option<String>,
    pub is_overridden: bool,
    pub override_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
