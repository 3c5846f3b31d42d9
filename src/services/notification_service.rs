use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Typed events produced by job handlers. The notification service is the
/// dispatcher: it maps each event onto a named payload and persists it
/// scoped to the owning user, keeping pipeline code unaware of the
/// delivery transport.
#[derive(Debug, Clone)]
pub enum JobEvent {
    GradingProgress {
        grader_id: Uuid,
        submission_id: Uuid,
        percentage: f64,
    },
    GradingCompleted {
        grader_id: Uuid,
        submission_id: Uuid,
    },
    GradingFailed {
        grader_id: Uuid,
        submission_id: Uuid,
        reason: String,
    },
    EmbeddingCompleted {
        course_id: Uuid,
    },
    EmbeddingFailed {
        course_id: Uuid,
        reason: String,
    },
}

impl JobEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            JobEvent::GradingProgress { .. } => "grading:progress",
            JobEvent::GradingCompleted { .. } | JobEvent::GradingFailed { .. } => {
                "grading:complete"
            }
            JobEvent::EmbeddingCompleted { .. } | JobEvent::EmbeddingFailed { .. } => {
                "embedding:complete"
            }
        }
    }

    pub fn payload(&self) -> JsonValue {
        match self {
            JobEvent::GradingProgress {
                grader_id,
                submission_id,
                percentage,
            } => json!({
                "grader_id": grader_id,
                "submission_id": submission_id,
                "percentage": percentage,
            }),
            JobEvent::GradingCompleted {
                grader_id,
                submission_id,
            } => json!({
                "grader_id": grader_id,
                "submission_id": submission_id,
                "status": "completed",
            }),
            JobEvent::GradingFailed {
                grader_id,
                submission_id,
                reason,
            } => json!({
                "grader_id": grader_id,
                "submission_id": submission_id,
                "status": "failed",
                "reason": reason,
            }),
            JobEvent::EmbeddingCompleted { course_id } => json!({
                "course_id": course_id,
                "status": "completed",
            }),
            JobEvent::EmbeddingFailed { course_id, reason } => json!({
                "course_id": course_id,
                "status": "failed",
                "reason": reason,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub owner_id: String,
    pub event_name: String,
    pub payload: JsonValue,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an event for the owning user's sessions. Delivery failures
    /// are the caller's concern only insofar as they are logged; the
    /// pipeline never fails because a notification could not be written.
    pub async fn emit_to_owner(&self, owner_id: &str, event: &JobEvent) {
        let result = sqlx::query(
            "INSERT INTO notification_events (owner_id, event_name, payload) VALUES ($1, $2, $3)",
        )
        .bind(owner_id)
        .bind(event.event_name())
        .bind(event.payload())
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            tracing::warn!(%owner_id, event = event.event_name(), %err, "failed to record notification event");
        }
    }

    pub async fn events_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationEvent>> {
        let events = sqlx::query_as::<_, NotificationEvent>(
            r#"
            SELECT id, owner_id, event_name, payload, created_at
            FROM notification_events
            WHERE owner_id = $1 AND created_at > $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_maps_to_progress_channel() {
        let event = JobEvent::GradingProgress {
            grader_id: Uuid::nil(),
            submission_id: Uuid::nil(),
            percentage: 50.0,
        };
        assert_eq!(event.event_name(), "grading:progress");
        assert_eq!(event.payload()["percentage"], 50.0);
    }

    #[test]
    fn completion_and_failure_share_a_channel_with_distinct_status() {
        let done = JobEvent::GradingCompleted {
            grader_id: Uuid::nil(),
            submission_id: Uuid::nil(),
        };
        let failed = JobEvent::GradingFailed {
            grader_id: Uuid::nil(),
            submission_id: Uuid::nil(),
            reason: "rubric empty".into(),
        };
        assert_eq!(done.event_name(), "grading:complete");
        assert_eq!(failed.event_name(), "grading:complete");
        assert_eq!(done.payload()["status"], "completed");
        assert_eq!(failed.payload()["status"], "failed");
        assert_eq!(failed.payload()["reason"], "rubric empty");
    }

    #[test]
    fn embedding_events_carry_course_scope() {
        let event = JobEvent::EmbeddingCompleted {
            course_id: Uuid::nil(),
        };
        assert_eq!(event.event_name(), "embedding:complete");
        assert_eq!(event.payload()["status"], "completed");
    }
}
