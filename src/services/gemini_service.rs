use crate::error::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

const API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Thin REST client for the Google Generative Language API. Constructed
/// with an optional key: when no credentials are configured every caller
/// is expected to take its documented offline fallback instead of calling
/// through.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    generation_model: String,
    embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub uri: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        client: Client,
        generation_model: String,
        embedding_model: String,
    ) -> Self {
        Self {
            client,
            api_key,
            generation_model,
            embedding_model,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| crate::error::Error::Internal("Model credentials not configured".into()))
    }

    async fn post_json(&self, url: String, payload: JsonValue) -> Result<JsonValue> {
        let res = self
            .client
            .post(&url)
            .query(&[("key", self.key()?)])
            .json(&payload)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini API error {}: {}", status, text).into());
        }

        Ok(res.json().await?)
    }

    async fn generate(&self, model: &str, parts: Vec<JsonValue>) -> Result<String> {
        let payload = json!({ "contents": [{ "parts": parts }] });
        let body = self
            .post_json(
                format!("{}/v1beta/models/{}:generateContent", API_BASE, model),
                payload,
            )
            .await?;
        Ok(extract_candidate_text(&body))
    }

    pub async fn generate_content(&self, model: &str, prompt: &str) -> Result<String> {
        self.generate(model, vec![json!({ "text": prompt })]).await
    }

    /// Vision-style request with the document inlined as base64 bytes.
    pub async fn generate_with_inline_pdf(&self, prompt: &str, pdf_bytes: &[u8]) -> Result<String> {
        let parts = vec![
            json!({ "text": prompt }),
            json!({
                "inline_data": {
                    "mime_type": "application/pdf",
                    "data": BASE64.encode(pdf_bytes)
                }
            }),
        ];
        self.generate(&self.generation_model, parts).await
    }

    /// Request referencing a previously uploaded transient file.
    pub async fn generate_with_file(
        &self,
        prompt: &str,
        file_uri: &str,
        mime_type: &str,
    ) -> Result<String> {
        let parts = vec![
            json!({ "text": prompt }),
            json!({ "file_data": { "file_uri": file_uri, "mime_type": mime_type } }),
        ];
        self.generate(&self.generation_model, parts).await
    }

    /// Grounded request routed through a file-search store.
    pub async fn generate_with_file_search(
        &self,
        model: &str,
        prompt: &str,
        store_name: &str,
    ) -> Result<String> {
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "tools": [{ "fileSearch": { "fileSearchStoreNames": [store_name] } }]
        });
        let body = self
            .post_json(
                format!("{}/v1beta/models/{}:generateContent", API_BASE, model),
                payload,
            )
            .await?;
        Ok(extract_candidate_text(&body))
    }

    pub async fn embed_content(&self, text: &str) -> Result<Vec<f32>> {
        let payload = json!({ "content": { "parts": [{ "text": text }] } });
        let body = self
            .post_json(
                format!(
                    "{}/v1beta/models/{}:embedContent",
                    API_BASE, self.embedding_model
                ),
                payload,
            )
            .await?;
        let values = body
            .get("embedding")
            .and_then(|e| e.get("values"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|n| n.as_f64().map(|f| f as f32))
                    .collect()
            })
            .unwrap_or_default();
        Ok(values)
    }

    /// Upload raw bytes to the transient Files API; the returned URI is
    /// usable as a `file_data` part until the service expires it.
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile> {
        let res = self
            .client
            .post(format!("{}/upload/v1beta/files", API_BASE))
            .query(&[
                ("key", self.key()?),
                ("uploadType", "media"),
                ("displayName", display_name),
            ])
            .header("Content-Type", mime_type)
            .body(bytes)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini file upload error {}: {}", status, text).into());
        }

        let body: JsonValue = res.json().await?;
        let file = body.get("file").unwrap_or(&body);
        let name = file
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let uri = file
            .get("uri")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if uri.is_empty() {
            return Err(anyhow::anyhow!("Gemini file upload returned no uri").into());
        }
        Ok(UploadedFile { name, uri })
    }

    pub async fn delete_file(&self, file_name: &str) -> Result<()> {
        let res = self
            .client
            .delete(format!("{}/v1beta/{}", API_BASE, file_name))
            .query(&[("key", self.key()?)])
            .send()
            .await?;
        if !res.status().is_success() {
            tracing::warn!(%file_name, status = %res.status(), "failed to delete transient model file");
        }
        Ok(())
    }

    pub async fn create_file_search_store(&self, display_name: &str) -> Result<String> {
        let body = self
            .post_json(
                format!("{}/v1beta/fileSearchStores", API_BASE),
                json!({ "displayName": display_name }),
            )
            .await?;
        body.get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("file search store creation returned no name").into())
    }

    /// Import an uploaded file into a search store. Returns the
    /// long-running operation descriptor for polling.
    pub async fn import_file_to_store(
        &self,
        store_name: &str,
        file_name: &str,
    ) -> Result<JsonValue> {
        self.post_json(
            format!("{}/v1beta/{}:importFile", API_BASE, store_name),
            json!({ "fileName": file_name }),
        )
        .await
    }

    pub async fn get_operation(&self, operation_name: &str) -> Result<JsonValue> {
        let res = self
            .client
            .get(format!("{}/v1beta/{}", API_BASE, operation_name))
            .query(&[("key", self.key()?)])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini operation poll error {}: {}", status, text).into());
        }
        Ok(res.json().await?)
    }
}

fn extract_candidate_text(body: &JsonValue) -> String {
    body.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_candidate_parts() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(extract_candidate_text(&body), "ab");
    }

    #[test]
    fn missing_candidates_yield_empty_text() {
        assert_eq!(extract_candidate_text(&json!({})), "");
    }

    #[test]
    fn unconfigured_client_reports_offline() {
        let client = GeminiClient::new(
            None,
            Client::new(),
            "gemini-pro".into(),
            "text-embedding-004".into(),
        );
        assert!(!client.is_configured());
    }
}
