use crate::error::Result;
use crate::models::job::DeadLetterJob;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

/// Jobs that exhausted their retries, newest first. Kept for operator
/// inspection; rows are never consumed automatically.
pub async fn list_dead_letters(
    State(state): State<crate::AppState>,
) -> Result<impl IntoResponse> {
    let jobs = sqlx::query_as::<_, DeadLetterJob>(
        "SELECT * FROM dead_letter_jobs ORDER BY failed_at DESC LIMIT 100",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(json!({ "dead_letters": jobs })))
}
