use crate::dto::submission_dto::OverrideGradePayload;
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::job::{GradingJobPayload, JobPayload};
use crate::models::rubric::Rubric;
use crate::models::submission::{Submission, SubmissionGrade};
use crate::routes::graders::fetch_owned_grader;
use crate::services::pdf_service;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

const MAX_SUBMISSION_FILES: usize = 20;

/// Upload scanned submissions for a grader. Each file becomes one
/// `pending` submission; nothing is graded until grade-all is requested.
pub async fn upload_submissions(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(grader_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    fetch_owned_grader(&state, grader_id, &claims.sub).await?;

    let mut student_identifier: Option<String> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "student_identifier" => student_identifier = Some(field.text().await?),
            "files" => {
                let file_name = field.file_name().unwrap_or("submission.pdf").to_string();
                files.push((file_name, field.bytes().await?.to_vec()));
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(Error::BadRequest("No files provided".to_string()));
    }
    if files.len() > MAX_SUBMISSION_FILES {
        return Err(Error::BadRequest(format!(
            "At most {} submissions can be uploaded at once",
            MAX_SUBMISSION_FILES
        )));
    }

    let mut created = Vec::with_capacity(files.len());
    for (file_name, bytes) in files {
        let stored = state
            .storage_service
            .store_file(&bytes, &format!("{}-submission", grader_id), &file_name)
            .await?;

        let submission = sqlx::query_as::<_, Submission>(
            r#"
            INSERT INTO submissions (grader_id, student_identifier, file_path, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING *
            "#,
        )
        .bind(grader_id)
        .bind(student_identifier.clone().unwrap_or_else(|| file_name.clone()))
        .bind(&stored)
        .fetch_one(&state.pool)
        .await?;
        created.push(submission);
    }

    Ok((StatusCode::CREATED, Json(json!({ "submissions": created }))))
}

pub async fn list_submissions(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(grader_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    fetch_owned_grader(&state, grader_id, &claims.sub).await?;

    let submissions = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE grader_id = $1 ORDER BY created_at DESC",
    )
    .bind(grader_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(json!({ "submissions": submissions })))
}

pub async fn get_submission(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(submission_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let submission = sqlx::query_as::<_, Submission>(
        r#"
        SELECT s.* FROM submissions s
        JOIN graders g ON g.id = s.grader_id
        JOIN courses c ON c.id = g.course_id
        WHERE s.id = $1 AND c.user_id = $2
        "#,
    )
    .bind(submission_id)
    .bind(&claims.sub)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| Error::NotFound("Submission not found".to_string()))?;

    let grades = sqlx::query_as::<_, SubmissionGrade>(
        r#"
        SELECT sg.* FROM submission_grades sg
        JOIN rubrics r ON r.id = sg.rubric_id
        WHERE sg.submission_id = $1
        ORDER BY r.order_index ASC
        "#,
    )
    .bind(submission_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({ "submission": submission, "grades": grades })))
}

/// Dispatch one grading job per submission. OCR runs here so the job
/// payload is fully denormalized; a retry never re-runs answer
/// extraction. There is no batch semantic: each submission succeeds or
/// fails independently.
pub async fn grade_all(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(grader_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let grader = fetch_owned_grader(&state, grader_id, &claims.sub).await?;

    let rubric = sqlx::query_as::<_, Rubric>(
        "SELECT * FROM rubrics WHERE grader_id = $1 ORDER BY order_index ASC",
    )
    .bind(grader_id)
    .fetch_all(&state.pool)
    .await?;

    let submissions = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE grader_id = $1",
    )
    .bind(grader_id)
    .fetch_all(&state.pool)
    .await?;

    let mut queued = 0usize;
    for submission in &submissions {
        let mut student_answers: HashMap<String, String> = HashMap::new();
        let mut raw_text: Option<String> = None;

        if let Some(bytes) = state
            .storage_service
            .fetch_file_buffer(&submission.file_path)
            .await
        {
            let extracted = state.ocr_service.extract_answers(&bytes).await;
            raw_text = if extracted.raw_text.is_empty() {
                let local = pdf_service::extract_text(&bytes, &submission.file_path);
                (!local.is_empty()).then_some(local)
            } else {
                Some(extracted.raw_text)
            };
            student_answers = extracted.answers;
        }

        state
            .queue_service
            .enqueue(&JobPayload::Grading(GradingJobPayload {
                grader_id,
                submission_id: submission.id,
                course_id: grader.course_id,
                owner_id: claims.sub.clone(),
                rubric: rubric.clone(),
                student_answers,
                raw_text,
            }))
            .await?;
        queued += 1;
    }

    sqlx::query("UPDATE graders SET status = 'grading', updated_at = NOW() WHERE id = $1")
        .bind(grader_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({ "queued": queued })))
}

/// Override a single grade row. `is_overridden` flips on and the reason
/// is stored; the parent submission's totals are intentionally left as
/// the last full grading run produced them.
pub async fn override_grade(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(grade_id): Path<Uuid>,
    Json(payload): Json<OverrideGradePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let updated = sqlx::query(
        r#"
        UPDATE submission_grades sg
        SET marks_awarded = $2, is_overridden = TRUE, override_reason = $3, updated_at = NOW()
        FROM submissions s
        JOIN graders g ON g.id = s.grader_id
        JOIN courses c ON c.id = g.course_id
        WHERE sg.id = $1 AND s.id = sg.submission_id AND c.user_id = $4
        "#,
    )
    .bind(grade_id)
    .bind(rust_decimal::Decimal::from_f64_retain(payload.marks_awarded).unwrap_or_default())
    .bind(&payload.override_reason)
    .bind(&claims.sub)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::NotFound("Grade not found".to_string()));
    }
    Ok(Json(json!({ "updated": true })))
}
