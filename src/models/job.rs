use crate::models::rubric::Rubric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeadLetterJob {
    pub id: Uuid,
    pub job_id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub error: String,
    pub failed_at: Option<DateTime<Utc>>,
}

pub const TOPIC_EMBEDDING: &str = "embedding";
pub const TOPIC_GRADING: &str = "grading";

/// Everything a grading worker needs, denormalized at dispatch time so the
/// job does not re-fetch the rubric or re-run OCR on retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingJobPayload {
    pub grader_id: Uuid,
    pub submission_id: Uuid,
    pub course_id: Uuid,
    pub owner_id: String,
    pub rubric: Vec<Rubric>,
    pub student_answers: HashMap<String, String>,
    pub raw_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJobPayload {
    pub course_file_id: Uuid,
    pub course_id: Uuid,
    pub owner_id: String,
    pub file_path: String,
    pub file_name: String,
    pub mime_type: Option<String>,
}

/// Tagged union of everything that can sit on the queue; consumers match
/// exhaustively so a new topic cannot be silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum JobPayload {
    Embedding(EmbeddingJobPayload),
    Grading(GradingJobPayload),
}

impl JobPayload {
    pub fn topic(&self) -> &'static str {
        match self {
            JobPayload::Embedding(_) => TOPIC_EMBEDDING,
            JobPayload::Grading(_) => TOPIC_GRADING,
        }
    }
}
