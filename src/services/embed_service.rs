use crate::error::Result;
use crate::services::gemini_service::GeminiClient;

const CHUNK_SIZE_WORDS: usize = 800;
const CHUNK_OVERLAP_WORDS: usize = 50;

/// Dimensionality of the offline fallback vectors. Deliberately different
/// from the hosted embedding model so nothing downstream can bake in a
/// fixed dimension.
const FALLBACK_DIM: usize = 32;

#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: String,
    pub embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct EmbedService {
    gemini: GeminiClient,
}

impl EmbedService {
    pub fn new(gemini: GeminiClient) -> Self {
        Self { gemini }
    }

    /// Chunk a document and embed each chunk. Empty input yields no
    /// chunks. Without credentials this produces deterministic
    /// content-sensitive placeholder vectors so local retrieval still
    /// ranks meaningfully.
    pub async fn generate_embeddings(&self, content: &str) -> Result<Vec<EmbeddedChunk>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let chunks = chunk_text(content, CHUNK_SIZE_WORDS, CHUNK_OVERLAP_WORDS);

        if !self.gemini.is_configured() {
            return Ok(chunks
                .into_iter()
                .map(|chunk| {
                    let embedding = fallback_embedding(&chunk);
                    EmbeddedChunk { chunk, embedding }
                })
                .collect());
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self.gemini.embed_content(&chunk).await?;
            embedded.push(EmbeddedChunk { chunk, embedding });
        }
        Ok(embedded)
    }

    /// Single embedding for a query text, no chunking.
    pub async fn generate_query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if !self.gemini.is_configured() {
            return Ok(fallback_embedding(query));
        }
        self.gemini.embed_content(query).await
    }

    pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
        let mut dot = 0f32;
        let mut na = 0f32;
        let mut nb = 0f32;
        for (x, y) in a.iter().zip(b.iter()) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na.sqrt() * nb.sqrt())
        }
    }
}

/// Whitespace word windows with overlap so context spanning a boundary
/// appears in both neighbouring chunks.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();

    let mut i = 0;
    while i < words.len() {
        let end = (i + size).min(words.len());
        let slice = words[i..end].join(" ");
        if !slice.is_empty() {
            chunks.push(slice);
        }
        if end == words.len() {
            break;
        }
        i += step;
    }

    if chunks.is_empty() && !text.trim().is_empty() {
        chunks.push(text.trim().to_string());
    }
    chunks
}

/// Deterministic hashed bag-of-words vector: each word lands in a bucket
/// via FNV-1a, the counts are L2-normalized. Content-sensitive enough for
/// round-trip retrieval in credential-less environments.
pub fn fallback_embedding(text: &str) -> Vec<f32> {
    let mut buckets = vec![0f32; FALLBACK_DIM];
    for word in text.split_whitespace() {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        buckets[(hash % FALLBACK_DIM as u64) as usize] += 1.0;
    }
    let norm: f32 = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in buckets.iter_mut() {
            *v /= norm;
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn chunks_overlap_across_boundaries() {
        let text = words(1000);
        let chunks = chunk_text(&text, 800, 50);
        assert_eq!(chunks.len(), 2);
        // The second chunk starts 750 words in, repeating the last 50.
        assert!(chunks[1].starts_with("w750 "));
        assert!(chunks[0].ends_with("w799"));
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("a handful of words", 800, 50);
        assert_eq!(chunks, vec!["a handful of words".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 800, 50).is_empty());
        assert!(chunk_text("   ", 800, 50).is_empty());
    }

    #[test]
    fn fallback_embedding_is_deterministic_and_content_sensitive() {
        let a = fallback_embedding("the derivative of x squared");
        let b = fallback_embedding("the derivative of x squared");
        let c = fallback_embedding("completely unrelated biology terms");
        assert_eq!(a, b);
        assert!(EmbedService::cosine_sim(&a, &c) < 0.99);
        assert!((EmbedService::cosine_sim(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_fallback_embedding_is_zero_vector() {
        let v = fallback_embedding("");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn offline_round_trip_ranks_source_chunk_in_top_results() {
        let service = EmbedService::new(GeminiClient::new(
            None,
            reqwest::Client::new(),
            "gemini-pro".into(),
            "text-embedding-004".into(),
        ));

        let documents = [
            "photosynthesis converts light energy into chemical energy in plants",
            "the derivative measures the instantaneous rate of change of a function",
            "supply and demand determine market equilibrium prices",
        ];
        let mut chunks = Vec::new();
        for doc in documents {
            chunks.extend(service.generate_embeddings(doc).await.expect("embed"));
        }

        let query = service
            .generate_query_embedding("instantaneous rate of change of a function")
            .await
            .expect("query embedding");

        let mut ranked: Vec<(&EmbeddedChunk, f32)> = chunks
            .iter()
            .map(|c| (c, EmbedService::cosine_sim(&query, &c.embedding)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("finite similarity"));

        assert!(ranked[0].0.chunk.contains("derivative"));
    }
}
