use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::DigestEntry;

const BUFFER_FILE: &str = "weekly_articles.json";

/// Articles delivered since the last weekly digest, as one JSON array.
#[derive(Debug, Clone)]
pub struct DigestBuffer {
    path: PathBuf,
}

impl DigestBuffer {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(BUFFER_FILE),
        }
    }

    /// `None` when no buffer file exists.
    pub async fn load(&self) -> Result<Option<Vec<DigestEntry>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// A corrupt buffer is replaced rather than blocking delivery.
    pub async fn append(&self, entry: DigestEntry) -> Result<()> {
        let mut entries = match self.load().await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Discarding unreadable digest buffer: {}", e);
                Vec::new()
            }
        };
        entries.push(entry);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
