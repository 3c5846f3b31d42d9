use crate::services::embed_service::EmbedService;
use crate::services::file_search_service::FileSearchService;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const CONTEXT_CHAR_CAP: usize = 1200;
const VECTOR_MATCH_COUNT: usize = 3;

/// Retrieval-augmented context assembly. Context is an enrichment: either
/// retrieval path failing (or returning nothing) must never block grading,
/// so both paths swallow their own errors down to an empty string.
#[derive(Clone)]
pub struct RagService {
    pool: PgPool,
    embed: EmbedService,
    file_search: FileSearchService,
}

impl RagService {
    pub fn new(pool: PgPool, embed: EmbedService, file_search: FileSearchService) -> Self {
        Self {
            pool,
            embed,
            file_search,
        }
    }

    pub async fn fetch_context(&self, course_id: Uuid, query: &str) -> String {
        if query.trim().is_empty() {
            return String::new();
        }

        let (file_search_context, vector_context) = tokio::join!(
            self.file_search_context(course_id, query),
            self.vector_context(course_id, query)
        );

        let mut chunks = Vec::new();
        if !file_search_context.is_empty() {
            chunks.push(truncate_chars(&file_search_context, CONTEXT_CHAR_CAP));
        }
        if !vector_context.is_empty() {
            chunks.push(truncate_chars(&vector_context, CONTEXT_CHAR_CAP));
        }
        chunks.join("\n\n---\n\n")
    }

    async fn file_search_context(&self, course_id: Uuid, query: &str) -> String {
        match self.file_search.fetch_context(course_id, query).await {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(%course_id, %err, "file search retrieval failed, continuing without it");
                String::new()
            }
        }
    }

    async fn vector_context(&self, course_id: Uuid, query: &str) -> String {
        match self.try_vector_context(course_id, query).await {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(%course_id, %err, "vector retrieval failed, continuing without it");
                String::new()
            }
        }
    }

    /// Rank the course's stored chunks by cosine similarity against the
    /// query embedding and return the top matches.
    async fn try_vector_context(&self, course_id: Uuid, query: &str) -> crate::error::Result<String> {
        let query_embedding = self.embed.generate_query_embedding(query).await?;
        if query_embedding.is_empty() {
            tracing::warn!("empty query embedding, returning empty context");
            return Ok(String::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT ce.content_chunk, ce.embedding
            FROM course_embeddings ce
            JOIN course_files cf ON cf.id = ce.course_file_id
            WHERE cf.course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(String, f32)> = rows
            .into_iter()
            .filter_map(|row| {
                let chunk: String = row.try_get("content_chunk").ok()?;
                let embedding: serde_json::Value = row.try_get("embedding").ok()?;
                let vector: Vec<f32> = serde_json::from_value(embedding).ok()?;
                let score = EmbedService::cosine_sim(&query_embedding, &vector);
                Some((chunk, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(VECTOR_MATCH_COUNT);

        Ok(scored
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "ééé".repeat(600);
        let truncated = truncate_chars(&text, CONTEXT_CHAR_CAP);
        assert_eq!(truncated.chars().count(), CONTEXT_CHAR_CAP);
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_chars("abc", CONTEXT_CHAR_CAP), "abc");
    }
}
