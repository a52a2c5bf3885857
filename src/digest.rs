use chrono::{FixedOffset, Offset, Utc};

use crate::ai::Analyzer;
use crate::config::Config;
use crate::error::Result;
use crate::message::Composer;
use crate::services::MessagingClient;
use crate::store::DigestBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    NothingToSend,
    Sent(usize),
    /// AI or delivery failed; the buffer is kept for the next attempt.
    Deferred,
}

/// The weekly job: summarize everything delivered since the last digest
/// and push one overview bubble.
pub struct WeeklyDigest {
    buffer: DigestBuffer,
    analyzer: Analyzer,
    composer: Composer,
    messaging: MessagingClient,
    recipient: String,
    offset: FixedOffset,
}

impl WeeklyDigest {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            buffer: DigestBuffer::new(&config.data_dir),
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
            recipient: config.require_push()?.to_string(),
            offset: FixedOffset::east_opt(config.utc_offset_hours * 3600)
                .unwrap_or_else(|| Utc.fix()),
        })
    }

    pub async fn send(&self) -> Result<DigestOutcome> {
        let Some(entries) = self.buffer.load().await? else {
            tracing::info!("No weekly digest buffer, nothing to summarize");
            return Ok(DigestOutcome::NothingToSend);
        };

        if entries.is_empty() {
            tracing::info!("Weekly digest buffer is empty, removing it");
            self.buffer.clear().await?;
            return Ok(DigestOutcome::NothingToSend);
        }

        tracing::info!("Summarizing {} articles for the weekly digest", entries.len());
        let overview = match self.analyzer.summarize_week(&entries).await {
            Ok(overview) => overview,
            Err(e) => {
                tracing::error!("Weekly summary failed, keeping the buffer: {}", e);
                return Ok(DigestOutcome::Deferred);
            }
        };

        let today = Utc::now().with_timezone(&self.offset).date_naive();
        let bubble = self.composer.digest_bubble(&overview, &entries, today);
        let message = Composer::flex("今週のテックニュースまとめ", bubble);

        if !self.messaging.push(&self.recipient, &[message]).await {
            return Ok(DigestOutcome::Deferred);
        }

        self.buffer.clear().await?;
        tracing::info!("Weekly digest sent, buffer cleared");
        Ok(DigestOutcome::Sent(entries.len()))
    }
}
