use crate::error::Result;
use crate::services::gemini_service::GeminiClient;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

/// Managed document-search index, one per course, created lazily. The
/// created store's name is persisted back onto the course row and acts as
/// the create-at-most-once signal; two racing first uploads can still each
/// create a store, which is an accepted gap.
#[derive(Clone)]
pub struct FileSearchService {
    pool: PgPool,
    gemini: GeminiClient,
    enabled: bool,
    model: String,
    store_prefix: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl FileSearchService {
    pub fn new(
        pool: PgPool,
        gemini: GeminiClient,
        enabled: bool,
        model: String,
        store_prefix: String,
        poll_interval_ms: u64,
        max_wait_ms: u64,
    ) -> Self {
        Self {
            pool,
            gemini,
            enabled,
            model,
            store_prefix,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_wait: Duration::from_millis(max_wait_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.gemini.is_configured()
    }

    /// Resolve the course's store name, creating it on first use.
    pub async fn ensure_course_store(&self, course_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT title, file_search_store_name FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        if let Some(existing) = row.try_get::<Option<String>, _>("file_search_store_name")? {
            return Ok(Some(existing));
        }

        if !self.is_enabled() {
            return Ok(None);
        }

        let title: String = row.try_get("title")?;
        let display_name: String = format!("{}{}", self.store_prefix, title)
            .chars()
            .take(60)
            .collect();
        let store_name = self.gemini.create_file_search_store(&display_name).await?;

        sqlx::query("UPDATE courses SET file_search_store_name = $2, updated_at = NOW() WHERE id = $1")
            .bind(course_id)
            .bind(&store_name)
            .execute(&self.pool)
            .await?;

        Ok(Some(store_name))
    }

    /// Register an uploaded course file with the course's search store.
    pub async fn register_file(
        &self,
        course_id: Uuid,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let Some(store_name) = self.ensure_course_store(course_id).await? else {
            return Ok(false);
        };

        let uploaded = self.gemini.upload_file(bytes, mime_type, file_name).await?;
        let operation = self
            .gemini
            .import_file_to_store(&store_name, &uploaded.name)
            .await?;
        self.wait_for_operation(operation).await?;
        Ok(true)
    }

    async fn wait_for_operation(&self, operation: serde_json::Value) -> Result<()> {
        if operation.get("done").and_then(|d| d.as_bool()).unwrap_or(true) {
            return Ok(());
        }
        let Some(name) = operation.get("name").and_then(|n| n.as_str()).map(String::from) else {
            return Ok(());
        };

        let deadline = tokio::time::Instant::now() + self.max_wait;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow::anyhow!("file search import timed out").into());
            }
            tokio::time::sleep(self.poll_interval).await;
            let op = self.gemini.get_operation(&name).await?;
            if op.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
                return Ok(());
            }
        }
    }

    /// Ask the search index for relevant excerpts; "" when unavailable.
    pub async fn fetch_context(&self, course_id: Uuid, query: &str) -> Result<String> {
        if !self.is_enabled() {
            return Ok(String::new());
        }
        let Some(store_name) = self.ensure_course_store(course_id).await? else {
            return Ok(String::new());
        };

        let prompt = [
            "You are a retrieval assistant for grading.",
            "Use file search to find the most relevant excerpts.",
            "Return only the relevant excerpts (no commentary), in plain text.",
            "Limit to ~1200 characters total.",
            "",
            &format!("Query: {}", query),
        ]
        .join("\n");

        let text = self
            .gemini
            .generate_with_file_search(&self.model, &prompt, &store_name)
            .await?;
        Ok(text.trim().to_string())
    }
}
