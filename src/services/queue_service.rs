use crate::error::Result;
use crate::models::job::JobPayload;
use crate::services::{embedding_job, grading_job};
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

/// Durable work distribution over a `jobs` table. Workers claim one due
/// job at a time with `FOR UPDATE SKIP LOCKED`, so any number of worker
/// loops can share the queue. Failed attempts are retried with
/// exponential backoff; once attempts are exhausted the job is copied to
/// `dead_letter_jobs` for inspection instead of being dropped.
#[derive(Clone)]
pub struct QueueService {
    pool: PgPool,
    max_attempts: i32,
    backoff_base: Duration,
}

impl QueueService {
    pub fn new(pool: PgPool, max_attempts: i32, backoff_base_ms: u64) -> Self {
        Self {
            pool,
            max_attempts,
            backoff_base: Duration::from_millis(backoff_base_ms),
        }
    }

    pub async fn enqueue(&self, payload: &JobPayload) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (topic, payload, status, max_attempts)
            VALUES ($1, $2, 'pending', $3)
            RETURNING id
            "#,
        )
        .bind(payload.topic())
        .bind(serde_json::to_value(payload)?)
        .bind(self.max_attempts)
        .fetch_one(&self.pool)
        .await?;
        let id: Uuid = row.try_get("id")?;
        Ok(id)
    }

    /// Claim and execute at most one due job. Returns false when the
    /// queue had nothing to do.
    pub async fn run_once(&self, state: &crate::AppState) -> Result<bool> {
        let rec = sqlx::query(
            r#"
            UPDATE jobs SET status = 'running', started_at = NOW(), attempts = attempts + 1
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, payload, attempts, max_attempts
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = rec else { return Ok(false) };

        let job_id: Uuid = row.try_get("id")?;
        let raw_payload: serde_json::Value = row.try_get("payload")?;
        let attempts: i32 = row.try_get("attempts")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;

        let payload = match serde_json::from_value::<JobPayload>(raw_payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                // A payload this process cannot read will never succeed;
                // park it immediately.
                let message = format!("undecodable job payload: {}", err);
                tracing::error!(%job_id, %message);
                self.mark_failed(job_id, &raw_payload, "unknown", &message)
                    .await?;
                return Ok(true);
            }
        };

        let outcome = match &payload {
            JobPayload::Embedding(embedding) => embedding_job::handle(state, embedding).await,
            JobPayload::Grading(grading) => grading_job::handle(state, grading).await,
        };

        match outcome {
            Ok(()) => {
                sqlx::query(
                    "UPDATE jobs SET status = 'succeeded', finished_at = NOW(), last_error = NULL WHERE id = $1",
                )
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            }
            Err(err) => {
                let message = err.to_string();
                if attempts < max_attempts {
                    let delay = self.backoff_delay(attempts);
                    let next_retry = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(5));
                    tracing::warn!(
                        %job_id, attempt = attempts, ?delay,
                        "job attempt failed, scheduling retry: {}", message
                    );
                    sqlx::query(
                        "UPDATE jobs SET status = 'pending', next_retry_at = $2, last_error = $3 WHERE id = $1",
                    )
                    .bind(job_id)
                    .bind(next_retry)
                    .bind(&message)
                    .execute(&self.pool)
                    .await?;
                } else {
                    tracing::error!(
                        %job_id, attempts,
                        "job exhausted its retries, moving to dead letter queue: {}", message
                    );
                    self.mark_failed(job_id, &raw_payload, payload.topic(), &message)
                        .await?;
                }
            }
        }

        Ok(true)
    }

    /// Exponential backoff: base delay doubling per completed attempt.
    pub fn backoff_delay(&self, attempt: i32) -> Duration {
        let exponent = attempt.saturating_sub(1).clamp(0, 16) as u32;
        self.backoff_base * 2u32.saturating_pow(exponent)
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        raw_payload: &serde_json::Value,
        topic: &str,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', finished_at = NOW(), last_error = $2 WHERE id = $1",
        )
        .bind(job_id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO dead_letter_jobs (job_id, topic, payload, error) VALUES ($1, $2, $3, $4)",
        )
        .bind(job_id)
        .bind(topic)
        .bind(raw_payload)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> QueueService {
        // The pool is never touched by backoff computation.
        let pool = PgPool::connect_lazy("postgres://localhost/unused").expect("lazy pool");
        QueueService::new(pool, 3, 5_000)
    }

    #[tokio::test]
    async fn backoff_doubles_per_attempt() {
        let queue = service();
        assert_eq!(queue.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(queue.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(queue.backoff_delay(3), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn backoff_is_defined_for_degenerate_attempts() {
        let queue = service();
        assert_eq!(queue.backoff_delay(0), Duration::from_secs(5));
        assert!(queue.backoff_delay(40) >= queue.backoff_delay(17));
    }
}
