use serde::Deserialize;

/// Inbound webhook payload. Unknown fields are ignored. Events are kept raw
/// so that one malformed event does not reject the rest of the batch.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

impl WebhookBody {
    pub fn into_events(self) -> Vec<Event> {
        self.events
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| match serde_json::from_value(raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Skipping malformed webhook event {}: {}", index, e);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Event {
    Message {
        reply_token: Option<String>,
        message: MessageContent,
    },
    Postback {
        reply_token: Option<String>,
        postback: Postback,
    },
    /// follow, unfollow, join and anything else we do not answer.
    #[serde(other)]
    Other,
}

impl Event {
    pub fn reply_token(&self) -> Option<&str> {
        match self {
            Event::Message { reply_token, .. } | Event::Postback { reply_token, .. } => {
                reply_token.as_deref()
            }
            Event::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Postback {
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_postback_events() {
        let body: WebhookBody = serde_json::from_str(
            r#"{
                "destination": "U0",
                "events": [
                    {"type": "message", "replyToken": "r1", "timestamp": 1,
                     "source": {"type": "user", "userId": "U1"},
                     "message": {"type": "text", "id": "m1", "text": "最新情報"}},
                    {"type": "postback", "replyToken": "r2",
                     "postback": {"data": "action=quiz_answer&is_correct=1"}},
                    {"type": "message", "replyToken": "r3",
                     "message": {"type": "sticker", "id": "m2", "packageId": "1"}},
                    {"type": "follow", "replyToken": "r4"}
                ]
            }"#,
        )
        .unwrap();
        let events = body.into_events();

        assert_eq!(
            events[0],
            Event::Message {
                reply_token: Some("r1".to_string()),
                message: MessageContent::Text {
                    text: "最新情報".to_string()
                },
            }
        );
        assert_eq!(events[1].reply_token(), Some("r2"));
        assert!(matches!(
            events[2],
            Event::Message {
                message: MessageContent::Other,
                ..
            }
        ));
        assert_eq!(events[3], Event::Other);
    }

    #[test]
    fn missing_events_is_an_empty_batch() {
        let body: WebhookBody = serde_json::from_str(r#"{"destination": "U0"}"#).unwrap();
        assert!(body.into_events().is_empty());
    }

    #[test]
    fn malformed_events_are_skipped_individually() {
        let body: WebhookBody = serde_json::from_str(
            r#"{
                "events": [
                    {"type": "postback", "replyToken": "r1"},
                    {"type": "message", "replyToken": "r2",
                     "message": {"type": "text", "text": "最新情報"}},
                    "not an event"
                ]
            }"#,
        )
        .unwrap();

        let events = body.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reply_token(), Some("r2"));
    }
}
