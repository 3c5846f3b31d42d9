use crate::error::Result;
use crate::middleware::auth::Claims;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;

#[derive(serde::Deserialize)]
pub struct PollQuery {
    #[serde(default = "default_since")]
    since: chrono::DateTime<chrono::Utc>,
}

fn default_since() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() - chrono::Duration::minutes(5)
}

/// Owner-scoped event poll: progress and completion events recorded by
/// the pipeline since the given cursor, oldest first.
pub async fn poll_notifications(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PollQuery>,
) -> Result<impl IntoResponse> {
    let events = state
        .notification_service
        .events_since(&claims.sub, query.since)
        .await?;
    Ok(Json(json!({ "events": events })))
}
