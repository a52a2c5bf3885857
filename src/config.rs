use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::Feed;

pub const DEFAULT_AI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_SEARCH_KEYWORD: &str = "最新情報";

const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";
const DEFAULT_AI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_SCRAPING_API_URL: &str = "https://chrome.browserless.io/content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// Latest item per feed, watermark files, push delivery.
    #[default]
    Push,
    /// Every item per feed, persisted to the article store.
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Queue,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub line_api: String,
    pub ai_api: String,
    pub scraping_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            line_api: DEFAULT_LINE_API_BASE.to_string(),
            ai_api: DEFAULT_AI_API_BASE.to_string(),
            scraping_api: DEFAULT_SCRAPING_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub channel_access_token: String,
    pub channel_secret: Option<String>,
    pub user_id: Option<String>,

    pub ai_api_keys: Vec<String>,
    pub ai_models: Vec<String>,
    pub scraping_api_key: Option<String>,

    pub force_delivery: bool,
    pub ingest_mode: IngestMode,
    pub store_backend: StoreBackend,

    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub queue_dir: PathBuf,
    pub feeds_path: PathBuf,

    pub feed_pause_secs: u64,
    pub bind_addr: String,
    pub search_keyword: String,
    pub utc_offset_hours: i32,

    pub endpoints: Endpoints,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feed-bot")
}

/// Splits a comma separated variable, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn load() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(AppError::Config(format!("could not read .env: {}", e)));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let channel_access_token = get("LINE_CHANNEL_ACCESS_TOKEN").ok_or_else(|| {
            AppError::Config("LINE_CHANNEL_ACCESS_TOKEN must be set".to_string())
        })?;

        let ai_models = get("AI_MODELS")
            .map(|v| split_list(&v))
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_AI_MODEL.to_string()]);

        let ingest_mode = match get("INGEST_MODE").as_deref() {
            None | Some("push") => IngestMode::Push,
            Some("store") => IngestMode::Store,
            Some(other) => {
                return Err(AppError::Config(format!("unknown INGEST_MODE `{}`", other)))
            }
        };

        let store_backend = match get("STORE_BACKEND").as_deref() {
            None | Some("sqlite") => StoreBackend::Sqlite,
            Some("queue") => StoreBackend::Queue,
            Some(other) => {
                return Err(AppError::Config(format!("unknown STORE_BACKEND `{}`", other)))
            }
        };

        let data_dir = get("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let feed_pause_secs = match get("FEED_PAUSE_SECS") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("FEED_PAUSE_SECS is not a number: {}", v)))?,
            None => 4,
        };

        let utc_offset_hours = match get("UTC_OFFSET_HOURS") {
            Some(v) => v
                .trim()
                .parse()
                .ok()
                .filter(|h: &i32| (-23..=23).contains(h))
                .ok_or_else(|| AppError::Config(format!("invalid UTC_OFFSET_HOURS: {}", v)))?,
            None => 9,
        };

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            line_api: get("LINE_API_BASE").unwrap_or(defaults.line_api),
            ai_api: get("AI_API_BASE").unwrap_or(defaults.ai_api),
            scraping_api: get("SCRAPING_API_URL").unwrap_or(defaults.scraping_api),
        };

        Ok(Self {
            channel_access_token,
            channel_secret: get("LINE_CHANNEL_SECRET"),
            user_id: get("LINE_USER_ID"),
            ai_api_keys: get("AI_API_KEY").map(|v| split_list(&v)).unwrap_or_default(),
            ai_models,
            scraping_api_key: get("SCRAPING_API_KEY"),
            force_delivery: get("FORCE_DELIVERY").as_deref() == Some("true"),
            ingest_mode,
            store_backend,
            db_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("articles.db")),
            queue_dir: get("QUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("queue")),
            data_dir,
            feeds_path: get("FEEDS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("feeds.toml")),
            feed_pause_secs,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            search_keyword: get("SEARCH_KEYWORD")
                .unwrap_or_else(|| DEFAULT_SEARCH_KEYWORD.to_string()),
            utc_offset_hours,
            endpoints,
        })
    }

    /// Push delivery needs a recipient.
    pub fn require_push(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AppError::Config("LINE_USER_ID must be set".to_string()))
    }

    /// The webhook cannot run without the signing secret.
    pub fn require_webhook(&self) -> Result<&str> {
        self.channel_secret
            .as_deref()
            .ok_or_else(|| AppError::Config("LINE_CHANNEL_SECRET must be set".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedList {
    pub feeds: Vec<Feed>,
}

impl FeedList {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("could not read feed list {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let list: FeedList = toml::from_str(content)?;

        if list.feeds.is_empty() {
            return Err(AppError::Config("feed list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for feed in &list.feeds {
            if !seen.insert(feed.name.as_str()) {
                return Err(AppError::Config(format!("duplicate feed name `{}`", feed.name)));
            }
        }

        Ok(list)
    }
}
