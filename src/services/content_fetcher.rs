use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;

use crate::error::Result;
use crate::feed::BROWSER_USER_AGENT;

/// Text and Open Graph image of an article page. Both are empty when the
/// page could not be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleContent {
    pub text: String,
    pub image_url: Option<String>,
}

/// Headless-browser rendering service used instead of a direct fetch.
#[derive(Debug, Clone)]
pub struct ScrapingProxy {
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
}

pub struct ContentFetcher {
    client: Client,
    proxy: Option<ScrapingProxy>,
    script_re: Regex,
    style_re: Regex,
    tag_re: Regex,
    space_re: Regex,
}

impl ContentFetcher {
    pub fn new(proxy: Option<ScrapingProxy>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(15))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            proxy,
            script_re: Regex::new(r"(?is)<script\b[^>]*>.*?</script>")?,
            style_re: Regex::new(r"(?is)<style\b[^>]*>.*?</style>")?,
            tag_re: Regex::new(r"(?s)<[^>]*>")?,
            space_re: Regex::new(r"\s+")?,
        })
    }

    /// Fetch an article page and extract its text and og:image. Failures
    /// are logged and yield empty content.
    pub async fn fetch(&self, article_url: &str) -> ArticleContent {
        let html = match self.fetch_html(article_url).await {
            Ok(Some(html)) => html,
            Ok(None) => return ArticleContent::default(),
            Err(e) => {
                tracing::warn!("Failed to fetch article {}: {}", article_url, e);
                return ArticleContent::default();
            }
        };

        let image_url = extract_og_image(&html);
        if let Some(image) = &image_url {
            tracing::debug!("Found og:image {}", image);
        }

        ArticleContent {
            text: self.extract_text(&html),
            image_url,
        }
    }

    async fn fetch_html(&self, article_url: &str) -> Result<Option<String>> {
        let request = match &self.proxy {
            Some(proxy) => {
                tracing::debug!("Fetching {} through the scraping proxy", article_url);
                self.client
                    .post(&proxy.endpoint)
                    .query(&[("token", proxy.api_key.as_str())])
                    .json(&ScrapeRequest { url: article_url })
            }
            None => self.client.get(article_url),
        };

        let response = request.send().await?;

        if response.status() != reqwest::StatusCode::OK {
            tracing::warn!(
                "Failed to fetch article {}: HTTP {}",
                article_url,
                response.status()
            );
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }

    /// Drop scripts, styles and markup, then collapse whitespace.
    pub fn extract_text(&self, html: &str) -> String {
        let text = self.script_re.replace_all(html, "");
        let text = self.style_re.replace_all(&text, "");
        let text = self.tag_re.replace_all(&text, "");
        let text = self.space_re.replace_all(&text, " ");
        text.trim().to_string()
    }
}

/// First `<meta property="og:image">` content, entity-decoded by the parser.
fn extract_og_image(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:image"]"#).ok()?;
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head>
<meta property="og:image" content="https://cdn.example.com/img.png?a=1&amp;b=2" />
<style>body { color: red; }</style>
<script type="text/javascript">var x = "<p>hidden</p>";</script>
</head>
<body>
  <h1>Hello</h1>
  <p>Rust   is
  fun.</p>
</body></html>"#;

    #[test]
    fn extracts_text_without_scripts_or_styles() {
        let fetcher = ContentFetcher::new(None).unwrap();
        let text = fetcher.extract_text(PAGE);
        assert_eq!(text, "Hello Rust is fun.");
    }

    #[test]
    fn extracts_decoded_og_image() {
        assert_eq!(
            extract_og_image(PAGE).as_deref(),
            Some("https://cdn.example.com/img.png?a=1&b=2")
        );
        assert_eq!(extract_og_image("<html><body>No image</body></html>"), None);
    }

    #[tokio::test]
    async fn direct_fetch_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let fetcher = ContentFetcher::new(None).unwrap();
        let content = fetcher.fetch(&format!("{}/post", server.uri())).await;
        assert_eq!(content.text, "Hello Rust is fun.");
        assert!(content.image_url.is_some());
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = ContentFetcher::new(None).unwrap();
        let content = fetcher.fetch(&format!("{}/missing", server.uri())).await;
        assert_eq!(content, ArticleContent::default());
    }

    #[tokio::test]
    async fn proxy_is_used_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .and(query_param("token", "secret"))
            .and(body_json(serde_json::json!({ "url": "https://blog.example.com/post" })))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = ContentFetcher::new(Some(ScrapingProxy {
            endpoint: format!("{}/content", server.uri()),
            api_key: "secret".to_string(),
        }))
        .unwrap();
        let content = fetcher.fetch("https://blog.example.com/post").await;
        assert_eq!(content.text, "Hello Rust is fun.");
    }
}
