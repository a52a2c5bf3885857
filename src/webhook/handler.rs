use std::sync::Arc;

use serde_json::{json, Value};

use super::events::{Event, MessageContent};
use crate::error::Result;
use crate::message::{sanitize_postbacks, Composer, QuizAnswer, MAX_CAROUSEL_BUBBLES};
use crate::models::Article;
use crate::services::MessagingClient;
use crate::store::ArticleStore;

pub const CORRECT_REPLY: &str = "正解です！🎉 さすがですね！";
pub const TRY_LATER_REPLY: &str = "しばらくしてから再度お試しください";
const NO_UNREAD_REPLY: &str = "新しい記事はまだありません。";

/// A recognized text command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Latest,
    Search(&'a str),
}

/// `<keyword>` alone, or `<keyword> <term>` split on the first whitespace run.
pub fn parse_command<'a>(keyword: &str, text: &'a str) -> Option<Command<'a>> {
    let text = text.trim();
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    if head != keyword {
        return None;
    }

    if rest.is_empty() {
        Some(Command::Latest)
    } else {
        Some(Command::Search(rest))
    }
}

pub fn quiz_reply(answer: &QuizAnswer) -> String {
    if answer.is_correct {
        return CORRECT_REPLY.to_string();
    }
    format!(
        "残念、不正解です！\n正解は「{}」でした。\n次もチャレンジしてみてくださいね！",
        answer.correct_answer.as_deref().unwrap_or_default()
    )
}

fn text_message(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

/// Stored bubbles replayed with today's payload limits applied.
fn carousel(alt_text: &str, articles: &[Article]) -> Value {
    let bubbles = articles
        .iter()
        .map(|article| {
            let mut bubble = article.rendered_message.clone();
            sanitize_postbacks(&mut bubble);
            bubble
        })
        .collect();
    Composer::carousel(alt_text, bubbles)
}

/// Reply-side state machine over the article store.
pub struct Handler {
    store: Arc<dyn ArticleStore>,
    messaging: MessagingClient,
    keyword: String,
}

impl Handler {
    pub fn new(store: Arc<dyn ArticleStore>, messaging: MessagingClient, keyword: &str) -> Self {
        Self {
            store,
            messaging,
            keyword: keyword.to_string(),
        }
    }

    /// Handle one event. Failures are logged and answered with a generic
    /// reply; they never reach the HTTP response.
    pub async fn handle(&self, event: &Event) {
        let Some(reply_token) = event.reply_token() else {
            tracing::debug!("Ignoring event without reply token");
            return;
        };

        if let Err(e) = self.dispatch(event, reply_token).await {
            tracing::error!("Failed to handle webhook event: {}", e);
            self.messaging
                .reply(reply_token, &[text_message(TRY_LATER_REPLY)])
                .await;
        }
    }

    async fn dispatch(&self, event: &Event, reply_token: &str) -> Result<()> {
        match event {
            Event::Postback { postback, .. } => {
                let Some(answer) = QuizAnswer::decode(&postback.data) else {
                    tracing::debug!("Ignoring postback {}", postback.data);
                    return Ok(());
                };
                self.messaging
                    .reply(reply_token, &[text_message(&quiz_reply(&answer))])
                    .await;
                Ok(())
            }
            Event::Message {
                message: MessageContent::Text { text },
                ..
            } => match parse_command(&self.keyword, text) {
                Some(Command::Latest) => self.reply_latest(reply_token).await,
                Some(Command::Search(term)) => self.reply_search(reply_token, term).await,
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Deliver up to ten unread articles and archive exactly those, only
    /// after the reply went through.
    async fn reply_latest(&self, reply_token: &str) -> Result<()> {
        let articles = self.store.unread(MAX_CAROUSEL_BUBBLES).await?;
        if articles.is_empty() {
            self.messaging
                .reply(reply_token, &[text_message(NO_UNREAD_REPLY)])
                .await;
            return Ok(());
        }

        let message = carousel("最新のテック記事をお届けします", &articles);
        if !self.messaging.reply(reply_token, &[message]).await {
            tracing::warn!("Reply failed, leaving {} articles unread", articles.len());
            return Ok(());
        }

        let urls: Vec<String> = articles.into_iter().map(|a| a.url).collect();
        let archived = self.store.archive(&urls).await?;
        tracing::info!("Delivered and archived {} of {} articles", archived, urls.len());
        Ok(())
    }

    /// Read-only: search results never change archive state.
    async fn reply_search(&self, reply_token: &str, term: &str) -> Result<()> {
        let articles = self.store.search(term, MAX_CAROUSEL_BUBBLES).await?;
        tracing::info!("Search for {:?} matched {} articles", term, articles.len());

        let message = if articles.is_empty() {
            text_message(&format!("「{}」に関する記事は見つかりませんでした。", term))
        } else {
            carousel(&format!("「{}」の検索結果", term), &articles)
        };
        self.messaging.reply(reply_token, &[message]).await;
        Ok(())
    }
}
