use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::Article;
use crate::store::ArticleStore;

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "url, title, published_at, source, summary, tags, quiz, image_url, is_archived, rendered_message";

pub struct Repository {
    conn: Connection,
}

/// Raw column values; JSON columns are decoded outside the connection thread.
struct ArticleRow {
    url: String,
    title: String,
    published_at: String,
    source: String,
    summary: String,
    tags: String,
    quiz: Option<String>,
    image_url: Option<String>,
    is_archived: bool,
    rendered_message: String,
}

impl Repository {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    async fn select(&self, archived_filter: Option<bool>, limit: Option<usize>) -> Result<Vec<Article>> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut sql = format!("SELECT {} FROM articles", ARTICLE_COLUMNS);
                if archived_filter.is_some() {
                    sql.push_str(" WHERE is_archived = ?1");
                }
                sql.push_str(" ORDER BY published_at DESC, id DESC");
                if let Some(limit) = limit {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = match archived_filter {
                    Some(archived) => stmt
                        .query_map(params![archived as i64], article_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?,
                    None => stmt
                        .query_map([], article_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?,
                };
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(article_from_row).collect()
    }
}

#[async_trait]
impl ArticleStore for Repository {
    async fn contains(&self, url: &str) -> Result<bool> {
        let url = url.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE url = ?1",
                    params![url],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    async fn insert(&self, article: &Article) -> Result<bool> {
        let tags_json = serde_json::to_string(&article.tags)?;
        let quiz_json = article.quiz.as_ref().map(serde_json::to_string).transpose()?;
        let message_json = serde_json::to_string(&article.rendered_message)?;
        let article = article.clone();

        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO articles (url, title, published_at, source, summary, tags, quiz, image_url, rendered_message)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                       ON CONFLICT(url) DO NOTHING"#,
                    params![
                        article.url,
                        article.title,
                        article.published_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                        article.source,
                        article.summary,
                        tags_json,
                        quiz_json,
                        article.image_url,
                        message_json,
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?;
        Ok(inserted)
    }

    async fn unread(&self, limit: usize) -> Result<Vec<Article>> {
        self.select(Some(false), Some(limit)).await
    }

    async fn search(&self, term: &str, limit: usize) -> Result<Vec<Article>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows = self
            .conn
            .call(move |conn| {
                // SQLite's lower() folds ASCII only, so it can narrow the scan
                // for ASCII terms. Every candidate is rechecked below.
                let mut sql = format!("SELECT {} FROM articles", ARTICLE_COLUMNS);
                if needle.is_ascii() {
                    sql.push_str(
                        " WHERE instr(lower(title || char(10) || summary || char(10) || tags), ?1) > 0",
                    );
                }
                sql.push_str(" ORDER BY published_at DESC, id DESC");

                let mut stmt = conn.prepare(&sql)?;
                let candidates = if needle.is_ascii() {
                    stmt.query_map(params![needle], article_row)?
                } else {
                    stmt.query_map([], article_row)?
                };

                let mut rows = Vec::new();
                for row in candidates {
                    let row = row?;
                    if row_matches(&row, &needle) {
                        rows.push(row);
                        if rows.len() == limit {
                            break;
                        }
                    }
                }
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(article_from_row).collect()
    }

    async fn archive(&self, urls: &[String]) -> Result<usize> {
        let urls = urls.to_vec();
        let archived = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut archived = 0;
                {
                    let mut stmt = tx.prepare(
                        "UPDATE articles SET is_archived = 1 WHERE url = ?1 AND is_archived = 0",
                    )?;
                    for url in &urls {
                        archived += stmt.execute(params![url])?;
                    }
                }
                tx.commit()?;
                Ok(archived)
            })
            .await?;
        Ok(archived)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Same rule as `Article::matches`, applied before the JSON columns other
/// than tags are decoded.
fn row_matches(row: &ArticleRow, needle: &str) -> bool {
    row.title.to_lowercase().contains(needle)
        || row.summary.to_lowercase().contains(needle)
        || serde_json::from_str::<Vec<String>>(&row.tags)
            .map(|tags| tags.iter().any(|tag| tag.to_lowercase().contains(needle)))
            .unwrap_or(false)
}

fn article_row(row: &Row) -> rusqlite::Result<ArticleRow> {
    Ok(ArticleRow {
        url: row.get(0)?,
        title: row.get(1)?,
        published_at: row.get(2)?,
        source: row.get(3)?,
        summary: row.get(4)?,
        tags: row.get(5)?,
        quiz: row.get(6)?,
        image_url: row.get(7)?,
        is_archived: row.get::<_, i64>(8)? != 0,
        rendered_message: row.get(9)?,
    })
}

fn article_from_row(row: ArticleRow) -> Result<Article> {
    Ok(Article {
        published_at: parse_datetime(&row.published_at).unwrap_or_else(Utc::now),
        tags: serde_json::from_str(&row.tags)?,
        quiz: row.quiz.as_deref().map(serde_json::from_str).transpose()?,
        rendered_message: serde_json::from_str(&row.rendered_message)?,
        url: row.url,
        title: row.title,
        source: row.source,
        summary: row.summary,
        image_url: row.image_url,
        is_archived: row.is_archived,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quiz;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn article(n: i64, tags: &[&str]) -> Article {
        Article {
            url: format!("https://blog.example.com/{}", n),
            title: format!("Post {}", n),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::minutes(n),
            source: "blog".to_string(),
            summary: format!("Summary {}", n),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            quiz: None,
            image_url: None,
            is_archived: false,
            rendered_message: json!({ "type": "bubble", "n": n }),
        }
    }

    #[tokio::test]
    async fn stores_and_reads_back_all_fields() {
        let repo = Repository::open_in_memory().await.unwrap();
        let mut a = article(1, &["AI", "クラウド"]);
        a.quiz = Some(Quiz {
            question: "Q?".to_string(),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_index: 2,
        });
        a.image_url = Some("https://cdn.example.com/1.png".to_string());

        assert!(repo.insert(&a).await.unwrap());
        assert!(repo.contains(&a.url).await.unwrap());
        assert!(!repo.contains("https://blog.example.com/missing").await.unwrap());

        let stored = repo.unread(10).await.unwrap();
        assert_eq!(stored, vec![a]);
    }

    #[tokio::test]
    async fn insert_ignores_duplicate_urls() {
        let repo = Repository::open_in_memory().await.unwrap();
        assert!(repo.insert(&article(1, &[])).await.unwrap());

        let mut changed = article(1, &[]);
        changed.title = "Rewritten".to_string();
        assert!(!repo.insert(&changed).await.unwrap());

        let stored = repo.unread(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Post 1");
    }

    #[tokio::test]
    async fn archiving_ten_of_fifteen_leaves_five() {
        let repo = Repository::open_in_memory().await.unwrap();
        for n in 0..15 {
            repo.insert(&article(n, &[])).await.unwrap();
        }

        let batch = repo.unread(10).await.unwrap();
        let titles: Vec<_> = batch.iter().map(|a| a.title.clone()).collect();
        assert_eq!(titles.first().map(String::as_str), Some("Post 14"));
        assert_eq!(titles.last().map(String::as_str), Some("Post 5"));

        let urls: Vec<String> = batch.iter().map(|a| a.url.clone()).collect();
        assert_eq!(repo.archive(&urls).await.unwrap(), 10);

        let rest = repo.unread(10).await.unwrap();
        assert_eq!(rest.len(), 5);
        assert!(rest.iter().all(|a| !urls.contains(&a.url)));
    }

    #[tokio::test]
    async fn archive_counts_only_state_changes() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert(&article(1, &[])).await.unwrap();
        let urls = vec![
            "https://blog.example.com/1".to_string(),
            "https://blog.example.com/unknown".to_string(),
        ];
        assert_eq!(repo.archive(&urls).await.unwrap(), 1);
        assert_eq!(repo.archive(&urls).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_matches_tags_case_insensitively_across_archive() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert(&article(1, &["AI"])).await.unwrap();
        repo.insert(&article(2, &["Security"])).await.unwrap();
        repo.archive(&["https://blog.example.com/1".to_string()])
            .await
            .unwrap();

        for term in ["AI", "ai"] {
            let found = repo.search(term, 10).await.unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].url, "https://blog.example.com/1");
            assert!(found[0].is_archived);
        }
    }

    #[tokio::test]
    async fn search_is_capped_and_newest_first() {
        let repo = Repository::open_in_memory().await.unwrap();
        for n in 0..12 {
            repo.insert(&article(n, &["AI"])).await.unwrap();
        }
        let found = repo.search("ai", 10).await.unwrap();
        assert_eq!(found.len(), 10);
        assert_eq!(found[0].title, "Post 11");
    }

    #[tokio::test]
    async fn search_agrees_with_article_matching() {
        let repo = Repository::open_in_memory().await.unwrap();
        let mut articles = vec![
            article(1, &["AI", "クラウド"]),
            article(2, &["Security"]),
            article(3, &[]),
        ];
        articles[1].title = "Élan for Rust".to_string();
        articles[2].summary = "Serverless on the cloud".to_string();
        for a in &articles {
            repo.insert(a).await.unwrap();
        }

        for term in ["ai", "クラウド", "élan", "RUST", "cloud", "summary 2", "\",\"", "[", "missing", "  "] {
            let found: Vec<String> = repo
                .search(term, 10)
                .await
                .unwrap()
                .into_iter()
                .map(|a| a.url)
                .collect();
            let expected: Vec<String> = articles
                .iter()
                .rev()
                .filter(|a| a.matches(term))
                .map(|a| a.url.clone())
                .collect();
            assert_eq!(found, expected, "term {:?}", term);
        }
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/articles.db");
        {
            let repo = Repository::new(&path).await.unwrap();
            repo.insert(&article(1, &[])).await.unwrap();
        }
        let repo = Repository::new(&path).await.unwrap();
        assert!(repo.contains("https://blog.example.com/1").await.unwrap());
    }
}
