use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{sort_newest_first, ArticleStore};
use crate::error::Result;
use crate::models::Article;

/// File-per-article notification queue. A record lives in exactly one of
/// `pending/` or `archived/`; claiming it is a rename between the two.
/// Records are written in the queue root first and only then linked into
/// `pending/`, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct FileQueue {
    root: PathBuf,
    pending: PathBuf,
    archived: PathBuf,
}

impl FileQueue {
    pub async fn open(root: &Path) -> Result<Self> {
        let queue = Self {
            root: root.to_path_buf(),
            pending: root.join("pending"),
            archived: root.join("archived"),
        };
        tokio::fs::create_dir_all(&queue.pending).await?;
        tokio::fs::create_dir_all(&queue.archived).await?;
        Ok(queue)
    }

    fn file_name(url: &str) -> String {
        format!("{}.json", hex::encode(Sha256::digest(url.as_bytes())))
    }

    /// Whether `path` holds a complete record. Empty or torn files left by
    /// an interrupted write count as absent.
    async fn holds_record(path: &Path) -> Result<bool> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice::<Article>(&bytes).is_ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(staged: &Path, target: &Path) -> Result<bool> {
        match tokio::fs::hard_link(staged, target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if Self::holds_record(target).await? {
                    return Ok(false);
                }
                tracing::warn!("Replacing incomplete queue record {}", target.display());
                tokio::fs::rename(staged, target).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_dir(dir: &Path, archived: bool) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            // A record may have been claimed between listing and reading.
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_slice::<Article>(&bytes) {
                Ok(mut article) => {
                    article.is_archived = archived;
                    articles.push(article);
                }
                Err(e) => tracing::warn!("Skipping unreadable queue record {}: {}", path.display(), e),
            }
        }

        Ok(articles)
    }
}

#[async_trait]
impl ArticleStore for FileQueue {
    async fn contains(&self, url: &str) -> Result<bool> {
        let name = Self::file_name(url);
        Ok(Self::holds_record(&self.pending.join(&name)).await?
            || Self::holds_record(&self.archived.join(&name)).await?)
    }

    async fn insert(&self, article: &Article) -> Result<bool> {
        if self.contains(&article.url).await? {
            return Ok(false);
        }

        let mut record = article.clone();
        record.is_archived = false;
        let bytes = serde_json::to_vec(&record)?;

        let name = Self::file_name(&article.url);
        let staged = self
            .root
            .join(format!("{}.{}.tmp", name, std::process::id()));
        tokio::fs::write(&staged, &bytes).await?;

        let published = Self::publish(&staged, &self.pending.join(&name)).await;
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Could not remove staged record {}: {}", staged.display(), e);
            }
        }
        published
    }

    async fn unread(&self, limit: usize) -> Result<Vec<Article>> {
        let mut articles = Self::read_dir(&self.pending, false).await?;
        sort_newest_first(&mut articles);
        articles.truncate(limit);
        Ok(articles)
    }

    async fn search(&self, term: &str, limit: usize) -> Result<Vec<Article>> {
        let mut articles = Self::read_dir(&self.pending, false).await?;
        articles.extend(Self::read_dir(&self.archived, true).await?);
        articles.retain(|article| article.matches(term));
        sort_newest_first(&mut articles);
        articles.truncate(limit);
        Ok(articles)
    }

    async fn archive(&self, urls: &[String]) -> Result<usize> {
        let mut claimed = 0;
        for url in urls {
            let name = Self::file_name(url);
            match tokio::fs::rename(self.pending.join(&name), self.archived.join(&name)).await {
                Ok(()) => claimed += 1,
                // Already claimed by another request.
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Queue record for {} already archived", url)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(claimed)
    }
}
