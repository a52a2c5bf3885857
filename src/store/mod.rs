mod digest_buffer;
mod queue;
mod watermark;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StoreBackend};
use crate::db::Repository;
use crate::error::Result;
use crate::models::Article;

pub use digest_buffer::DigestBuffer;
pub use queue::FileQueue;
pub use watermark::Watermarks;

/// Persisted articles, keyed by URL.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn contains(&self, url: &str) -> Result<bool>;

    /// Insert-or-ignore. Returns `false` when the URL was already stored.
    async fn insert(&self, article: &Article) -> Result<bool>;

    /// Unarchived articles, newest first.
    async fn unread(&self, limit: usize) -> Result<Vec<Article>>;

    /// Archived and unarchived articles matching `term`, newest first.
    async fn search(&self, term: &str, limit: usize) -> Result<Vec<Article>>;

    /// Archive exactly the given URLs. Returns how many flipped state.
    async fn archive(&self, urls: &[String]) -> Result<usize>;
}

pub async fn open(config: &Config) -> Result<Arc<dyn ArticleStore>> {
    match config.store_backend {
        StoreBackend::Sqlite => {
            tracing::debug!("Opening article database {}", config.db_path.display());
            Ok(Arc::new(Repository::new(&config.db_path).await?))
        }
        StoreBackend::Queue => {
            tracing::debug!("Opening notification queue {}", config.queue_dir.display());
            Ok(Arc::new(FileQueue::open(&config.queue_dir).await?))
        }
    }
}

/// Newest first; URL breaks ties so ordering is stable across backends.
pub(crate) fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.url.cmp(&b.url))
    });
}
