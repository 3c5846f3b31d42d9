use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::course::{Course, CourseFile};
use crate::models::job::{EmbeddingJobPayload, JobPayload};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;

const MATERIAL_FIELDS: [&str; 3] = ["study_guide", "textbook", "extra_content"];
const MAX_MATERIAL_FILES: usize = 9;

struct MaterialUpload {
    file_type: String,
    file_name: String,
    mime_type: Option<String>,
    bytes: Vec<u8>,
}

/// Create a course with its study materials. Each stored file gets a
/// `course_files` row in `processing` and an embedding job on the queue.
pub async fn create_course(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut topics: Option<serde_json::Value> = None;
    let mut uploads: Vec<MaterialUpload> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => title = Some(field.text().await?),
            "description" => description = Some(field.text().await?),
            "topics" => {
                let raw = field.text().await?;
                topics = serde_json::from_str::<Vec<String>>(&raw)
                    .ok()
                    .map(|list| json!(list));
            }
            field_name if MATERIAL_FIELDS.contains(&field_name) => {
                let file_name = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                uploads.push(MaterialUpload {
                    file_type: name,
                    file_name,
                    mime_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::BadRequest("title is required".to_string()))?;
    if uploads.len() > MAX_MATERIAL_FILES {
        return Err(Error::BadRequest(format!(
            "At most {} material files are accepted per course",
            MAX_MATERIAL_FILES
        )));
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (user_id, title, description, topics)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&claims.sub)
    .bind(&title)
    .bind(&description)
    .bind(&topics)
    .fetch_one(&state.pool)
    .await?;

    for upload in uploads {
        let stored_path = state
            .storage_service
            .store_file(
                &upload.bytes,
                &format!("{}-{}", course.id, upload.file_type),
                &upload.file_name,
            )
            .await?;

        let file_row = sqlx::query_as::<_, CourseFile>(
            r#"
            INSERT INTO course_files (course_id, file_name, file_type, file_path, file_size, status)
            VALUES ($1, $2, $3, $4, $5, 'processing')
            RETURNING *
            "#,
        )
        .bind(course.id)
        .bind(&upload.file_name)
        .bind(&upload.file_type)
        .bind(&stored_path)
        .bind(upload.bytes.len() as i64)
        .fetch_one(&state.pool)
        .await?;

        state
            .queue_service
            .enqueue(&JobPayload::Embedding(EmbeddingJobPayload {
                course_file_id: file_row.id,
                course_id: course.id,
                owner_id: claims.sub.clone(),
                file_path: stored_path,
                file_name: upload.file_name,
                mime_type: upload.mime_type,
            }))
            .await?;
    }

    Ok((StatusCode::CREATED, Json(json!({ "course": course }))))
}

pub async fn list_courses(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let courses = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(&claims.sub)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(json!({ "courses": courses })))
}

pub async fn list_course_files(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let owned = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM courses WHERE id = $1 AND user_id = $2",
    )
    .bind(course_id)
    .bind(&claims.sub)
    .fetch_one(&state.pool)
    .await?;
    if owned == 0 {
        return Err(Error::NotFound("Course not found".to_string()));
    }

    let files = sqlx::query_as::<_, CourseFile>(
        "SELECT * FROM course_files WHERE course_id = $1 ORDER BY created_at DESC",
    )
    .bind(course_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(json!({ "files": files })))
}
