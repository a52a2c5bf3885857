mod events;
mod handler;
mod signature;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, TraceLayer};
use tracing::Level;

use crate::config::Config;
use crate::error::Result;
use crate::services::MessagingClient;
use crate::store::ArticleStore;

pub use events::WebhookBody;
pub use handler::Handler;
#[cfg(test)]
pub use signature::sign;
pub use signature::{verify, SIGNATURE_HEADER};

#[derive(Clone)]
pub struct WebhookState {
    handler: Arc<Handler>,
    channel_secret: Arc<str>,
}

impl WebhookState {
    pub fn new(handler: Handler, channel_secret: &str) -> Self {
        Self {
            handler: Arc::new(handler),
            channel_secret: Arc::from(channel_secret),
        }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/webhook", post(receive))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO)),
            ),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// The signature is checked against the raw bytes before anything is
/// parsed. Once it is valid the response is 200 whatever the events do.
async fn receive(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        tracing::warn!("Rejecting webhook request without signature");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) = verify(&state.channel_secret, &body, signature) {
        tracing::warn!("Rejecting webhook request: {}", e);
        return StatusCode::BAD_REQUEST;
    }

    let payload: WebhookBody = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Rejecting malformed webhook body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let events = payload.into_events();
    tracing::debug!("Received {} webhook events", events.len());
    for event in &events {
        state.handler.handle(event).await;
    }

    StatusCode::OK
}

pub struct Server {
    socket: TcpListener,
    app: Router,
}

impl Server {
    pub async fn new(config: &Config, store: Arc<dyn ArticleStore>) -> Result<Self> {
        let channel_secret = config.require_webhook()?;
        let messaging = MessagingClient::new(
            &config.endpoints.line_api,
            config.channel_access_token.clone(),
        )?;
        let handler = Handler::new(store, messaging, &config.search_keyword);

        let bind_addr = &config.bind_addr;
        let socket = TcpListener::bind(bind_addr.as_str())
            .await
            .with_context(|| anyhow!("could not bind to `{bind_addr}`"))?;

        Ok(Self {
            socket,
            app: router(WebhookState::new(handler, channel_secret)),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        axum::serve(self.socket, self.app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Could not listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutting down webhook server");
            })
            .await
            .context("the webhook server encountered a failure")?;
        Ok(())
    }
}
