use crate::error::Result;
use crate::models::job::EmbeddingJobPayload;
use crate::services::notification_service::JobEvent;
use crate::services::pdf_service;
use serde_json::json;

/// Ingest one uploaded course file: register it with the course's search
/// index (best effort), extract its text, and persist one embedding row
/// per chunk. Hard failures re-raise for the queue's retry policy after
/// marking the file `failed`.
pub async fn handle(state: &crate::AppState, payload: &EmbeddingJobPayload) -> Result<()> {
    match run(state, payload).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let message = err.to_string();
            tracing::error!(
                course_file_id = %payload.course_file_id,
                "embedding failed: {}", message
            );
            let marked = sqlx::query(
                "UPDATE course_files SET status = 'failed', updated_at = NOW() WHERE id = $1",
            )
            .bind(payload.course_file_id)
            .execute(&state.pool)
            .await;
            if let Err(db_err) = marked {
                tracing::error!(course_file_id = %payload.course_file_id, %db_err, "failed to mark course file failed");
            }

            state
                .notification_service
                .emit_to_owner(
                    &payload.owner_id,
                    &JobEvent::EmbeddingFailed {
                        course_id: payload.course_id,
                        reason: message,
                    },
                )
                .await;
            Err(err)
        }
    }
}

async fn run(state: &crate::AppState, payload: &EmbeddingJobPayload) -> Result<()> {
    let bytes = state
        .storage_service
        .fetch_file_buffer(&payload.file_path)
        .await;

    // The search index can serve retrieval even when local text
    // extraction comes up empty, so registration happens first and its
    // failure is never fatal.
    let mut search_registered = false;
    if let Some(bytes) = &bytes {
        let mime_type = payload.mime_type.as_deref().unwrap_or("application/pdf");
        match state
            .file_search_service
            .register_file(
                payload.course_id,
                &payload.file_name,
                mime_type,
                bytes.clone(),
            )
            .await
        {
            Ok(registered) => search_registered = registered,
            Err(err) => {
                tracing::warn!(
                    course_file_id = %payload.course_file_id, %err,
                    "file search registration failed, continuing with local embeddings"
                );
            }
        }
    }

    let text_content = bytes
        .map(|b| pdf_service::extract_text(&b, &payload.file_name))
        .unwrap_or_default();

    if text_content.trim().is_empty() {
        let status = if search_registered {
            "embedded"
        } else {
            tracing::warn!(
                course_file_id = %payload.course_file_id,
                "no text content extracted; marking file as failed"
            );
            "failed"
        };
        sqlx::query("UPDATE course_files SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(payload.course_file_id)
            .bind(status)
            .execute(&state.pool)
            .await?;

        let event = if search_registered {
            JobEvent::EmbeddingCompleted {
                course_id: payload.course_id,
            }
        } else {
            JobEvent::EmbeddingFailed {
                course_id: payload.course_id,
                reason: "no text content extracted".to_string(),
            }
        };
        state
            .notification_service
            .emit_to_owner(&payload.owner_id, &event)
            .await;
        return Ok(());
    }

    let chunks = state.embed_service.generate_embeddings(&text_content).await?;
    for (idx, chunk) in chunks.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO course_embeddings (course_file_id, content_chunk, embedding, metadata)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(payload.course_file_id)
        .bind(&chunk.chunk)
        .bind(serde_json::to_value(&chunk.embedding)?)
        .bind(json!({ "idx": idx }))
        .execute(&state.pool)
        .await?;
    }

    sqlx::query("UPDATE course_files SET status = 'embedded', updated_at = NOW() WHERE id = $1")
        .bind(payload.course_file_id)
        .execute(&state.pool)
        .await?;

    state
        .notification_service
        .emit_to_owner(
            &payload.owner_id,
            &JobEvent::EmbeddingCompleted {
                course_id: payload.course_id,
            },
        )
        .await;

    Ok(())
}
