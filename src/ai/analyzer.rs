use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Analysis, DigestEntry, Quiz, MAX_TAGS, TAG_VOCABULARY};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ARTICLE_CHARS: usize = 15_000;
const MAX_UNAVAILABLE_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    tags: Vec<Value>,
    #[serde(default)]
    quiz: Option<Value>,
}

/// Outcome of one (credential, model) request.
enum Attempt {
    Success(String),
    RateLimited,
    Failed,
}

/// Client for the generative text service. Credentials are tried in order,
/// and for each credential every model in order.
pub struct Analyzer {
    client: Client,
    api_base: String,
    api_keys: Vec<String>,
    models: Vec<String>,
    backoff: Duration,
}

impl Analyzer {
    pub fn new(api_base: &str, api_keys: Vec<String>, models: Vec<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_keys,
            models,
            backoff: Duration::from_secs(2),
        })
    }

    /// Initial delay between retries of a temporarily unavailable model.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Summarize, tag and quiz an article. Never fails: any problem yields
    /// the empty default analysis.
    pub async fn analyze(&self, article_text: &str) -> Analysis {
        if !self.has_credentials() || article_text.trim().is_empty() {
            tracing::info!("AI key or article text is empty, skipping analysis");
            return Analysis::default();
        }

        let prompt = analysis_prompt(article_text);
        let config = GenerationConfig {
            max_output_tokens: 1024,
            temperature: 0.3,
            response_mime_type: Some("application/json"),
        };

        let raw = match self.generate(&prompt, config).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("AI analysis failed: {}", e);
                return Analysis::default();
            }
        };

        match parse_analysis(&raw) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("Could not parse AI analysis output: {}", e);
                Analysis::default()
            }
        }
    }

    /// Markdown overview of the week's delivered articles.
    pub async fn summarize_week(&self, entries: &[DigestEntry]) -> Result<String> {
        if !self.has_credentials() {
            return Err(AppError::AiApi("no AI credentials configured".to_string()));
        }

        let config = GenerationConfig {
            max_output_tokens: 1024,
            temperature: 0.5,
            response_mime_type: None,
        };

        let text = self.generate(&weekly_prompt(entries), config).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::AiApi("empty weekly summary".to_string()));
        }
        Ok(text.to_string())
    }

    async fn generate(&self, prompt: &str, config: GenerationConfig) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: config,
        };

        for (key_index, api_key) in self.api_keys.iter().enumerate() {
            for model in &self.models {
                match self.request(api_key, model, &request).await {
                    Attempt::Success(body) => {
                        tracing::info!("AI request succeeded with key #{} and {}", key_index + 1, model);
                        return candidate_text(&body);
                    }
                    Attempt::RateLimited => {
                        tracing::warn!("Key #{} is rate limited on {}, trying next model", key_index + 1, model);
                    }
                    Attempt::Failed => {
                        tracing::warn!("Key #{} failed on {}, trying next key", key_index + 1, model);
                        break;
                    }
                }
            }
        }

        Err(AppError::AiApi(
            "every credential and model combination failed".to_string(),
        ))
    }

    async fn request(&self, api_key: &str, model: &str, body: &GenerateRequest<'_>) -> Attempt {
        let url = format!("{}/v1beta/models/{}:generateContent", self.api_base, model);
        let mut delay = self.backoff;

        for attempt in 1..=MAX_UNAVAILABLE_ATTEMPTS {
            let response = match self
                .client
                .post(&url)
                .query(&[("key", api_key)])
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("AI request to {} failed: {}", model, e);
                    return Attempt::Failed;
                }
            };

            match response.status().as_u16() {
                200 => {
                    return match response.text().await {
                        Ok(text) => Attempt::Success(text),
                        Err(e) => {
                            tracing::warn!("Could not read AI response: {}", e);
                            Attempt::Failed
                        }
                    }
                }
                429 => return Attempt::RateLimited,
                503 if attempt < MAX_UNAVAILABLE_ATTEMPTS => {
                    tracing::warn!(
                        "{} unavailable (attempt {}/{}), retrying in {:?}",
                        model,
                        attempt,
                        MAX_UNAVAILABLE_ATTEMPTS,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                status => {
                    let error_text = response.text().await.unwrap_or_default();
                    tracing::warn!("AI request returned HTTP {}: {}", status, error_text);
                    return Attempt::Failed;
                }
            }
        }

        Attempt::Failed
    }
}

fn analysis_prompt(article_text: &str) -> String {
    let article: String = article_text.chars().take(MAX_ARTICLE_CHARS).collect();
    let tag_list = TAG_VOCABULARY.join(", ");

    format!(
        "以下の記事を分析し、指定のJSON形式で出力してください。\n\n\
         制約:\n\
         - summary: 顧客向けにスクラッチ開発を行うWebエンジニアの視点で、実務に応用できる提案を含めて日本語で200字程度に要約してください。\n\
         - tags: 記事の内容に最も関連性の高いタグを、以下のリストから最大3つまで選んでください。\n\
         利用可能なタグ: {tag_list}\n\
         - quiz: 記事の理解度を確認する3択クイズを1問作成してください。作成できない場合は null にしてください。correct_index は正解の選択肢の番号(0〜2)です。\n\n\
         記事:\n{article}\n\n\
         出力形式 (JSONのみを返すこと):\n\
         {{\n  \"summary\": \"ここに要約が入ります。\",\n  \"tags\": [\"タグ1\", \"タグ2\"],\n  \
         \"quiz\": {{\"question\": \"問題文\", \"options\": [\"選択肢1\", \"選択肢2\", \"選択肢3\"], \"correct_index\": 0}}\n}}"
    )
}

fn weekly_prompt(entries: &[DigestEntry]) -> String {
    let mut prompt = String::from(
        "以下は、今週開発者向けに配信された技術記事のリストです。\n\
         これらの記事全体を俯瞰し、今週の重要な技術トレンド、注目すべきニュース、セキュリティ情報などをまとめて、日本語のマークダウン形式で「週間サマリー」を作成してください。\n\
         特に重要なポイントを3〜5個の箇条書きでハイライトし、全体で400〜500字程度の読みやすい文章にしてください。\n\n\
         ---記事リスト---\n",
    );

    for (index, entry) in entries.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} (タグ: {})\n   要約: {}\n\n",
            index + 1,
            entry.title,
            entry.tags.join(", "),
            entry.summary
        ));
    }

    prompt.push_str("---ここまで---");
    prompt
}

/// `candidates[0].content.parts[0].text` of a response body.
fn candidate_text(body: &str) -> Result<String> {
    let response: GenerateResponse = serde_json::from_str(body)?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| AppError::AiApi("response has no candidate text".to_string()))
}

/// Remove a surrounding ```json ... ``` fence if the model added one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip the info string ("json") up to the end of the opening line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };

    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_analysis(raw: &str) -> Result<Analysis> {
    let parsed: RawAnalysis = serde_json::from_str(strip_code_fence(raw))?;

    let mut tags: Vec<String> = Vec::new();
    for tag in parsed.tags.iter().filter_map(Value::as_str) {
        let tag = tag.trim();
        if TAG_VOCABULARY.contains(&tag) && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }

    Ok(Analysis {
        summary: parsed.summary.unwrap_or_default().trim().to_string(),
        tags,
        quiz: parsed.quiz.as_ref().and_then(parse_quiz),
    })
}

/// A quiz survives only with a question, exactly three string options and
/// an integer index pointing at one of them.
fn parse_quiz(value: &Value) -> Option<Quiz> {
    let question = value.get("question")?.as_str()?.trim().to_string();
    let options = value
        .get("options")?
        .as_array()?
        .iter()
        .map(|o| o.as_str().map(|s| s.trim().to_string()))
        .collect::<Option<Vec<_>>>()?;
    let correct_index = usize::try_from(value.get("correct_index")?.as_u64()?).ok()?;

    let quiz = Quiz {
        question,
        options,
        correct_index,
    };
    quiz.is_valid().then_some(quiz)
}
