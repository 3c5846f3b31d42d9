use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Grader {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub total_marks: Option<Decimal>,
    pub test_file_path: Option<String>,
    pub memo_file_path: Option<String>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
