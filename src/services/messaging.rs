use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: &'a [Value],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: &'a [Value],
}

/// Messaging API client. Every call reports success as a plain `bool`:
/// only HTTP 200 counts, everything else is logged and treated as a failed
/// delivery so the caller leaves its state untouched.
#[derive(Clone)]
pub struct MessagingClient {
    client: Client,
    api_base: String,
    access_token: String,
}

impl MessagingClient {
    pub fn new(api_base: &str, access_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    pub async fn push(&self, to: &str, messages: &[Value]) -> bool {
        let url = format!("{}/v2/bot/message/push", self.api_base);
        self.send(&url, &PushRequest { to, messages }).await
    }

    pub async fn reply(&self, reply_token: &str, messages: &[Value]) -> bool {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        self.send(&url, &ReplyRequest { reply_token, messages }).await
    }

    async fn send<T: Serialize>(&self, url: &str, body: &T) -> bool {
        let response = match self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to send message: {}", e);
                return false;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            tracing::info!("Message sent");
            return true;
        }

        let error_text = response.text().await.unwrap_or_default();
        tracing::error!("Message delivery failed: HTTP {} {}", status, error_text);
        false
    }
}
