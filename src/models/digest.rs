use serde::{Deserialize, Serialize};

/// One delivered article, remembered for the weekly digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: String,
    pub date: String,
}
