use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::ai::Analyzer;
use crate::config::{Config, IngestMode};
use crate::error::Result;
use crate::feed::{parse_items, parse_latest, FeedFetcher};
use crate::message::{hero_image, BubbleContent, Composer};
use crate::models::{Article, DigestEntry, Feed, FeedItem, Quiz};
use crate::services::{ContentFetcher, MessagingClient, ScrapingProxy};
use crate::store::{self, ArticleStore, DigestBuffer, Watermarks};

const FALLBACK_SUMMARY_CHARS: usize = 100;

/// What happened to one feed during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Delivered,
    Unchanged,
    DeliveryFailed,
    Stored(usize),
}

/// Totals for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub delivered: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub stored: usize,
}

impl RunReport {
    fn record(&mut self, outcome: FeedOutcome) {
        match outcome {
            FeedOutcome::Delivered => self.delivered += 1,
            FeedOutcome::Unchanged => self.unchanged += 1,
            FeedOutcome::DeliveryFailed => self.failed += 1,
            FeedOutcome::Stored(count) => self.stored += count,
        }
    }
}

enum Sink {
    Push {
        recipient: String,
        watermarks: Watermarks,
        digest: DigestBuffer,
    },
    Store(Arc<dyn ArticleStore>),
}

/// The ingestion pipeline: fetch, detect, enrich, analyze, compose, then
/// push or persist.
pub struct App {
    feeds: Vec<Feed>,
    fetcher: FeedFetcher,
    content: ContentFetcher,
    analyzer: Analyzer,
    composer: Composer,
    messaging: MessagingClient,
    sink: Sink,
    force_delivery: bool,
    feed_pause: Duration,
}

impl App {
    pub async fn new(config: &Config, feeds: Vec<Feed>) -> Result<Self> {
        let sink = match config.ingest_mode {
            IngestMode::Push => Sink::Push {
                recipient: config.require_push()?.to_string(),
                watermarks: Watermarks::new(&config.data_dir),
                digest: DigestBuffer::new(&config.data_dir),
            },
            IngestMode::Store => Sink::Store(store::open(config).await?),
        };

        let proxy = config.scraping_api_key.as_ref().map(|key| ScrapingProxy {
            endpoint: config.endpoints.scraping_api.clone(),
            api_key: key.clone(),
        });

        Ok(Self {
            feeds,
            fetcher: FeedFetcher::new()?,
            content: ContentFetcher::new(proxy)?,
            analyzer: Analyzer::new(
                &config.endpoints.ai_api,
                config.ai_api_keys.clone(),
                config.ai_models.clone(),
            )?,
            composer: Composer::new(&config.search_keyword, config.utc_offset_hours),
            messaging: MessagingClient::new(
                &config.endpoints.line_api,
                config.channel_access_token.clone(),
            )?,
            sink,
            force_delivery: config.force_delivery,
            feed_pause: Duration::from_secs(config.feed_pause_secs),
        })
    }

    /// Process every feed in configuration order. A failing feed is logged
    /// and skipped; it never stops the others.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();
        if self.force_delivery && matches!(self.sink, Sink::Push { .. }) {
            tracing::info!("FORCE_DELIVERY is set, ignoring last notified URLs");
        }

        for (index, feed) in self.feeds.iter().enumerate() {
            if index > 0 && !self.feed_pause.is_zero() {
                tokio::time::sleep(self.feed_pause).await;
            }

            tracing::info!("Checking feed {} ({})", feed.name, feed.url);
            match self.process_feed(feed).await {
                Ok(outcome) => {
                    tracing::debug!("Feed {} finished: {:?}", feed.name, outcome);
                    report.record(outcome);
                }
                Err(e) => {
                    tracing::warn!("Skipping feed {}: {}", feed.name, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Run finished: {} delivered, {} unchanged, {} failed, {} stored",
            report.delivered,
            report.unchanged,
            report.failed,
            report.stored
        );
        report
    }

    async fn process_feed(&self, feed: &Feed) -> Result<FeedOutcome> {
        let bytes = self.fetcher.fetch(&feed.url).await?;

        match &self.sink {
            Sink::Push {
                recipient,
                watermarks,
                digest,
            } => {
                let item = parse_latest(&bytes)?;
                tracing::info!("Latest article: {} ({})", item.title, item.url);

                let last_notified = watermarks.load(&feed.name).await?;
                if !self.force_delivery && last_notified.as_deref() == Some(item.url.as_str()) {
                    tracing::info!("No new articles for {}", feed.name);
                    return Ok(FeedOutcome::Unchanged);
                }

                let article = self.build_article(feed, item).await;
                let alt_text = Composer::alt_text(&feed.label, &article.title, &article.tags);
                let message = Composer::flex(&alt_text, article.rendered_message.clone());

                if !self.messaging.push(recipient, &[message]).await {
                    return Ok(FeedOutcome::DeliveryFailed);
                }

                watermarks.save(&feed.name, &article.url).await?;
                tracing::info!("Updated last notified URL for {} to {}", feed.name, article.url);

                let entry = DigestEntry {
                    title: article.title.clone(),
                    url: article.url.clone(),
                    summary: article.summary.clone(),
                    tags: article.tags.clone(),
                    source: feed.label.clone(),
                    date: self.composer.format_timestamp(article.published_at),
                };
                if let Err(e) = digest.append(entry).await {
                    tracing::warn!("Could not record {} for the weekly digest: {}", article.url, e);
                }

                Ok(FeedOutcome::Delivered)
            }
            Sink::Store(store) => {
                let mut stored = 0;
                for item in parse_items(&bytes)? {
                    if store.contains(&item.url).await? {
                        continue;
                    }
                    let article = self.build_article(feed, item).await;
                    if store.insert(&article).await? {
                        tracing::info!("Stored {}", article.url);
                        stored += 1;
                    }
                }
                Ok(FeedOutcome::Stored(stored))
            }
        }
    }

    async fn build_article(&self, feed: &Feed, item: FeedItem) -> Article {
        let content = self.content.fetch(&item.url).await;
        let analysis = self.analyzer.analyze(&content.text).await;

        let summary = if analysis.summary.trim().is_empty() {
            tracing::info!("AI summary empty, falling back to the feed description");
            fallback_summary(&self.content.extract_text(&item.description))
        } else {
            analysis.summary
        };

        let quiz = analysis.quiz.filter(Quiz::is_valid);
        let image_url = hero_image(content.image_url.as_deref(), feed.default_image_url.as_deref())
            .map(str::to_string);
        let published_at = item.published_at.unwrap_or_else(Utc::now);

        let rendered_message = self.composer.bubble(&BubbleContent {
            label: &feed.label,
            title: &item.title,
            url: &item.url,
            tags: &analysis.tags,
            published_at,
            summary: &summary,
            quiz: quiz.as_ref(),
            image_url: image_url.as_deref(),
            default_image_url: None,
        });

        Article {
            url: item.url,
            title: item.title,
            published_at,
            source: feed.name.clone(),
            summary,
            tags: analysis.tags,
            quiz,
            image_url,
            is_archived: false,
            rendered_message,
        }
    }
}

/// First hundred characters of the plain description, with `…` when cut.
fn fallback_summary(description: &str) -> String {
    let description = description.trim();
    let mut summary: String = description.chars().take(FALLBACK_SUMMARY_CHARS).collect();
    if description.chars().count() > FALLBACK_SUMMARY_CHARS {
        summary.push('…');
    }
    summary
}
