use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// One file per feed holding the last notified URL as raw text.
#[derive(Debug, Clone)]
pub struct Watermarks {
    dir: PathBuf,
}

impl Watermarks {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path_for(&self, feed_name: &str) -> PathBuf {
        let safe: String = feed_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("last_notified_url_{}.txt", safe))
    }

    pub async fn load(&self, feed_name: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(feed_name)).await {
            Ok(contents) => {
                let url = contents.trim();
                Ok((!url.is_empty()).then(|| url.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the watermark through a temp file so readers never see a
    /// partial URL.
    pub async fn save(&self, feed_name: &str, url: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(feed_name);
        let tmp = path.with_extension("txt.tmp");
        tokio::fs::write(&tmp, url).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
