mod fetcher;
mod parser;

pub use fetcher::{FeedFetcher, BROWSER_USER_AGENT};
pub use parser::{parse_items, parse_latest};
