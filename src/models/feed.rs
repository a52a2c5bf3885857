use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub name: String,
    pub url: String,
    pub label: String,
    #[serde(default)]
    pub default_image_url: Option<String>,
}
