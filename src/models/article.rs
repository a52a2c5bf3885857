use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Quiz;

pub const TAG_VOCABULARY: [&str; 12] = [
    "セキュリティ",
    "Web開発",
    "アプリ開発",
    "クラウド",
    "インフラ",
    "AI",
    "プログラミング言語",
    "キャリア",
    "ハードウェア",
    "マーケティング",
    "マネジメント",
    "その他",
];

pub const MAX_TAGS: usize = 3;

/// A feed entry after normalization, before any enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub quiz: Option<Quiz>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    /// The composed bubble, replayed as-is by the webhook.
    pub rendered_message: serde_json::Value,
}

impl Article {
    /// Case-insensitive substring match against title, summary and tags.
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }

        self.title.to_lowercase().contains(&needle)
            || self.summary.to_lowercase().contains(&needle)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, summary: &str, tags: &[&str]) -> Article {
        Article {
            url: "https://example.com/a".to_string(),
            title: title.to_string(),
            published_at: Utc::now(),
            source: "test".to_string(),
            summary: summary.to_string(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            quiz: None,
            image_url: None,
            is_archived: false,
            rendered_message: serde_json::Value::Null,
        }
    }

    #[test]
    fn matches_tags_case_insensitively() {
        let a = article("Release notes", "", &["AI"]);
        assert!(a.matches("AI"));
        assert!(a.matches("ai"));
        assert!(!a.matches("Security"));
    }

    #[test]
    fn matches_title_and_summary() {
        let a = article("Rust 2024 edition", "Async closures land", &[]);
        assert!(a.matches("rust"));
        assert!(a.matches("CLOSURES"));
        assert!(!a.matches("python"));
    }

    #[test]
    fn blank_term_matches_nothing() {
        let a = article("Anything", "at all", &["AI"]);
        assert!(!a.matches("  "));
    }
}
