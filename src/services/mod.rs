mod content_fetcher;
mod messaging;

pub use content_fetcher::{ContentFetcher, ScrapingProxy};
pub use messaging::MessagingClient;
