use crate::dto::grader_dto::RubricItemPayload;
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::grader::Grader;
use crate::models::rubric::{Rubric, RubricDraft};
use crate::services::pdf_service;
use crate::services::rubric_service;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

struct DocumentUpload {
    file_name: String,
    bytes: Vec<u8>,
}

/// Create a grader from a test paper and memorandum. Rubric extraction
/// runs synchronously; any extraction failure degrades to a stub rubric
/// rather than failing grader creation.
pub async fn create_grader(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut course_id: Option<Uuid> = None;
    let mut title: Option<String> = None;
    let mut total_marks: Option<f64> = None;
    let mut test_file: Option<DocumentUpload> = None;
    let mut memo_file: Option<DocumentUpload> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "course_id" => {
                let raw = field.text().await?;
                course_id = Some(
                    Uuid::parse_str(raw.trim())
                        .map_err(|_| Error::BadRequest("invalid course_id".to_string()))?,
                );
            }
            "title" => title = Some(field.text().await?),
            "total_marks" => total_marks = field.text().await?.trim().parse().ok(),
            "test_file" | "memo_file" => {
                let upload = DocumentUpload {
                    file_name: field.file_name().unwrap_or("upload").to_string(),
                    bytes: field.bytes().await?.to_vec(),
                };
                if name == "test_file" {
                    test_file = Some(upload);
                } else {
                    memo_file = Some(upload);
                }
            }
            _ => {}
        }
    }

    let course_id =
        course_id.ok_or_else(|| Error::BadRequest("course_id is required".to_string()))?;
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::BadRequest("title is required".to_string()))?;

    ensure_course_owned(&state, course_id, &claims.sub).await?;

    let grader = sqlx::query_as::<_, Grader>(
        r#"
        INSERT INTO graders (course_id, title, total_marks, status)
        VALUES ($1, $2, $3, 'processing')
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(&title)
    .bind(total_marks.and_then(rust_decimal::Decimal::from_f64_retain))
    .fetch_one(&state.pool)
    .await?;

    let mut test_text = None;
    if let Some(upload) = &test_file {
        let stored = state
            .storage_service
            .store_file(&upload.bytes, &format!("{}-test", grader.id), &upload.file_name)
            .await?;
        sqlx::query("UPDATE graders SET test_file_path = $2, updated_at = NOW() WHERE id = $1")
            .bind(grader.id)
            .bind(&stored)
            .execute(&state.pool)
            .await?;
        test_text = Some(pdf_service::extract_text(&upload.bytes, &upload.file_name));
    }

    let mut memo_text = None;
    if let Some(upload) = &memo_file {
        let stored = state
            .storage_service
            .store_file(&upload.bytes, &format!("{}-memo", grader.id), &upload.file_name)
            .await?;
        sqlx::query("UPDATE graders SET memo_file_path = $2, updated_at = NOW() WHERE id = $1")
            .bind(grader.id)
            .bind(&stored)
            .execute(&state.pool)
            .await?;
        memo_text = Some(pdf_service::extract_text(&upload.bytes, &upload.file_name));
    }

    if let (Some(test_text), Some(memo_text)) = (test_text, memo_text) {
        let drafts = match state
            .rubric_service
            .extract_rubric(&test_text, &memo_text)
            .await
        {
            Ok(drafts) => drafts,
            Err(err) => {
                tracing::error!(grader_id = %grader.id, %err, "rubric extraction failed, inserting stub rubric");
                vec![rubric_service::offline_stub(&test_text, &memo_text)]
            }
        };

        insert_rubric_rows(&state, grader.id, &drafts).await?;

        sqlx::query("UPDATE graders SET status = 'ready', updated_at = NOW() WHERE id = $1")
            .bind(grader.id)
            .execute(&state.pool)
            .await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "grader_id": grader.id, "status": "processing" })),
    ))
}

pub async fn get_grader(
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

    Ok(Json(json!({ "grader": grader, "rubric": rubric })))
}

/// Replace the rubric wholesale. Order is array position; the previous
/// rows are deleted rather than diffed.
pub async fn replace_rubric(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(grader_id): Path<Uuid>,
    Json(items): Json<Vec<RubricItemPayload>>,
) -> Result<impl IntoResponse> {
    fetch_owned_grader(&state, grader_id, &claims.sub).await?;
    for item in &items {
        item.validate()?;
    }

    sqlx::query("DELETE FROM rubrics WHERE grader_id = $1")
        .bind(grader_id)
        .execute(&state.pool)
        .await?;

    let drafts: Vec<RubricDraft> = items
        .into_iter()
        .map(|item| RubricDraft {
            question_number: item.question_number,
            question_text: item.question_text,
            expected_answer: item.expected_answer,
            keywords: item.keywords,
            max_marks: item.max_marks,
        })
        .collect();
    insert_rubric_rows(&state, grader_id, &drafts).await?;

    Ok(Json(json!({ "updated": true })))
}

async fn insert_rubric_rows(
    state: &crate::AppState,
    grader_id: Uuid,
    drafts: &[RubricDraft],
) -> Result<()> {
    for (idx, draft) in drafts.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO rubrics
                (grader_id, question_number, question_text, expected_answer, keywords, max_marks, order_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(grader_id)
        .bind(&draft.question_number)
        .bind(&draft.question_text)
        .bind(&draft.expected_answer)
        .bind(draft.keywords.as_ref().map(|k| json!(k)))
        .bind(rust_decimal::Decimal::from_f64_retain(draft.max_marks).unwrap_or_default())
        .bind(idx as i32)
        .execute(&state.pool)
        .await?;
    }
    Ok(())
}

pub async fn ensure_course_owned(
    state: &crate::AppState,
    course_id: Uuid,
    user_id: &str,
) -> Result<()> {
    let owned = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM courses WHERE id = $1 AND user_id = $2",
    )
    .bind(course_id)
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;
    if owned == 0 {
        return Err(Error::NotFound("Course not found".to_string()));
    }
    Ok(())
}

pub async fn fetch_owned_grader(
    state: &crate::AppState,
    grader_id: Uuid,
    user_id: &str,
) -> Result<Grader> {
    let grader = sqlx::query_as::<_, Grader>(
        r#"
        SELECT g.* FROM graders g
        JOIN courses c ON c.id = g.course_id
        WHERE g.id = $1 AND c.user_id = $2
        "#,
    )
    .bind(grader_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| Error::NotFound("Grader not found".to_string()))?;
    Ok(grader)
}
