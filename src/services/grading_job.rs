use crate::error::{Error, Result};
use crate::models::job::GradingJobPayload;
use crate::models::rubric::Rubric;
use crate::services::notification_service::JobEvent;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Grade one submission end to end. Any failure marks the submission
/// `flagged` with a readable reason, emits a failure event, and re-raises
/// so the queue's retry policy gets a chance to reattempt the whole job.
pub async fn handle(state: &crate::AppState, payload: &GradingJobPayload) -> Result<()> {
    match run(state, payload).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let message = err.to_string();
            tracing::error!(
                submission_id = %payload.submission_id,
                "grading failed: {}", message
            );
            let flagged = sqlx::query(
                r#"
                UPDATE submissions
                SET status = 'flagged', feedback_summary = $2, processed_at = NOW(), updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(payload.submission_id)
            .bind(format!("Grading failed: {}", message))
            .execute(&state.pool)
            .await;
            if let Err(db_err) = flagged {
                tracing::error!(submission_id = %payload.submission_id, %db_err, "failed to flag submission");
            }

            state
                .notification_service
                .emit_to_owner(
                    &payload.owner_id,
                    &JobEvent::GradingFailed {
                        grader_id: payload.grader_id,
                        submission_id: payload.submission_id,
                        reason: message,
                    },
                )
                .await;
            Err(err)
        }
    }
}

async fn run(state: &crate::AppState, payload: &GradingJobPayload) -> Result<()> {
    sqlx::query("UPDATE submissions SET status = 'grading', updated_at = NOW() WHERE id = $1")
        .bind(payload.submission_id)
        .execute(&state.pool)
        .await?;

    // Idempotent restart: every attempt regrades from a clean slate.
    sqlx::query("DELETE FROM submission_grades WHERE submission_id = $1")
        .bind(payload.submission_id)
        .execute(&state.pool)
        .await?;

    if payload.rubric.is_empty() {
        return Err(Error::Internal(
            "No rubric items available for grading.".to_string(),
        ));
    }

    let mut rubric: Vec<Rubric> = payload.rubric.clone();
    rubric.sort_by_key(|item| item.order_index);

    let total_items = rubric.len();
    let mut total_score = 0f64;
    let mut max_score = 0f64;

    for (idx, item) in rubric.iter().enumerate() {
        let answer = resolve_answer(
            &payload.student_answers,
            &item.question_number,
            payload.raw_text.as_deref(),
        );
        let result = state
            .grading_service
            .grade_answer(payload.course_id, item, answer)
            .await?;

        total_score += result.marks_awarded;
        max_score += item.max_marks_f64();

        sqlx::query(
            r#"
            INSERT INTO submission_grades
                (submission_id, rubric_id, marks_awarded, ai_reasoning, confidence_score, feedback)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payload.submission_id)
        .bind(item.id)
        .bind(decimal(result.marks_awarded))
        .bind(&result.ai_reasoning)
        .bind(result.confidence_score)
        .bind(&result.feedback)
        .execute(&state.pool)
        .await?;

        state
            .notification_service
            .emit_to_owner(
                &payload.owner_id,
                &JobEvent::GradingProgress {
                    grader_id: payload.grader_id,
                    submission_id: payload.submission_id,
                    percentage: progress_percentage(idx + 1, total_items),
                },
            )
            .await;
    }

    let percentage = if max_score > 0.0 {
        (total_score / max_score) * 100.0
    } else {
        0.0
    };

    sqlx::query(
        r#"
        UPDATE submissions
        SET status = 'graded', total_score = $2, max_possible_score = $3, percentage = $4,
            feedback_summary = NULL, processed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(payload.submission_id)
    .bind(decimal(total_score))
    .bind(decimal(max_score))
    .bind(decimal(percentage))
    .execute(&state.pool)
    .await?;

    state
        .notification_service
        .emit_to_owner(
            &payload.owner_id,
            &JobEvent::GradingCompleted {
                grader_id: payload.grader_id,
                submission_id: payload.submission_id,
            },
        )
        .await;

    Ok(())
}

/// Answer resolution order: the segmented per-question answer, then the
/// whole raw transcript, then the empty string. An item with no resolvable
/// answer is still graded so every rubric row gets a grade row.
pub fn resolve_answer<'a>(
    answers: &'a HashMap<String, String>,
    question_number: &str,
    raw_text: Option<&'a str>,
) -> &'a str {
    answers
        .get(question_number)
        .map(String::as_str)
        .or(raw_text)
        .unwrap_or("")
}

/// Monotonic whole-percent progress for sequential item processing.
pub fn progress_percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((completed as f64 / total as f64) * 100.0).round()
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_item_rubric_reports_quarter_steps() {
        let observed: Vec<f64> = (1..=4).map(|done| progress_percentage(done, 4)).collect();
        assert_eq!(observed, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn progress_is_monotonic_for_uneven_counts() {
        let observed: Vec<f64> = (1..=3).map(|done| progress_percentage(done, 3)).collect();
        assert_eq!(observed, vec![33.0, 67.0, 100.0]);
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn resolves_segmented_answer_first() {
        let mut answers = HashMap::new();
        answers.insert("2".to_string(), "osmosis".to_string());
        assert_eq!(resolve_answer(&answers, "2", Some("full transcript")), "osmosis");
    }

    #[test]
    fn falls_back_to_raw_transcript_then_empty() {
        let answers = HashMap::new();
        assert_eq!(
            resolve_answer(&answers, "3", Some("full transcript")),
            "full transcript"
        );
        assert_eq!(resolve_answer(&answers, "3", None), "");
    }
}
