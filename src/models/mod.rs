mod analysis;
mod article;
mod digest;
mod feed;

pub use analysis::{Analysis, Quiz};
pub use article::{Article, FeedItem, MAX_TAGS, TAG_VOCABULARY};
pub use digest::DigestEntry;
pub use feed::Feed;
