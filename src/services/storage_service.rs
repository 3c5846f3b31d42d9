use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Object storage facade. Files live on local disk under the uploads
/// directory; callers hold opaque path strings and never assume a file is
/// still present ("not found" is `None`, not an error).
#[derive(Clone)]
pub struct StorageService {
    uploads_dir: PathBuf,
}

impl StorageService {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
        }
    }

    pub async fn store_file(
        &self,
        bytes: &[u8],
        prefix: &str,
        original_name: &str,
    ) -> Result<String> {
        fs::create_dir_all(&self.uploads_dir).await?;

        let safe_name = format!(
            "{}-{}-{}",
            prefix,
            chrono::Utc::now().timestamp_millis(),
            sanitize_file_name(original_name)
        );
        let full_path = self.uploads_dir.join(&safe_name);
        fs::write(&full_path, bytes).await?;

        Ok(full_path.to_string_lossy().into_owned())
    }

    pub async fn fetch_file_buffer(&self, storage_path: &str) -> Option<Vec<u8>> {
        match fs::read(Path::new(storage_path)).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!(%storage_path, %err, "unable to read stored file");
                None
            }
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_spaces_and_separators() {
        assert_eq!(
            sanitize_file_name("my exam../paper 1.pdf"),
            "my_exam.._paper_1.pdf"
        );
    }

    #[test]
    fn missing_file_is_none_not_error() {
        let storage = StorageService::new("uploads-test-none");
        tokio_test::block_on(async {
            assert!(storage.fetch_file_buffer("does/not/exist.pdf").await.is_none());
        });
    }
}
