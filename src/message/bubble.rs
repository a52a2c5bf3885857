use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde_json::{json, Value};
use url::Url;

use super::postback::{truncate_chars, QuizAnswer, MAX_LABEL_CHARS};
use crate::models::{DigestEntry, Quiz, MAX_TAGS};

pub const MAX_CAROUSEL_BUBBLES: usize = 10;
pub const MAX_IMAGE_URL_LEN: usize = 2000;
const MAX_ALT_TEXT_CHARS: usize = 400;

const HEADER_BG: &str = "#1E2A38";
const BODY_BG: &str = "#2D3748";
const ACCENT: &str = "#1DB446";
const MUTED: &str = "#A0AEC0";
const CHIP_BG: &str = "#4A5568";

/// Everything that appears in one article bubble.
#[derive(Debug, Clone)]
pub struct BubbleContent<'a> {
    pub label: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub tags: &'a [String],
    pub published_at: DateTime<Utc>,
    pub summary: &'a str,
    pub quiz: Option<&'a Quiz>,
    pub image_url: Option<&'a str>,
    pub default_image_url: Option<&'a str>,
}

pub fn is_valid_image_url(candidate: &str) -> bool {
    candidate.len() <= MAX_IMAGE_URL_LEN
        && Url::parse(candidate)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
            .unwrap_or(false)
}

/// Enriched image first, then the feed default, else nothing.
pub fn hero_image<'a>(image_url: Option<&'a str>, default_image_url: Option<&'a str>) -> Option<&'a str> {
    image_url
        .filter(|url| is_valid_image_url(url))
        .or_else(|| default_image_url.filter(|url| is_valid_image_url(url)))
}

/// Builds the visual messages. Pure: no I/O, no clock reads.
#[derive(Debug, Clone)]
pub struct Composer {
    search_keyword: String,
    offset: FixedOffset,
}

impl Composer {
    pub fn new(search_keyword: &str, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self {
            search_keyword: search_keyword.to_string(),
            offset,
        }
    }

    pub fn format_timestamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y/%m/%d %H:%M").to_string()
    }

    pub fn bubble(&self, content: &BubbleContent<'_>) -> Value {
        let mut body = vec![json!({
            "type": "text",
            "text": content.title,
            "weight": "bold",
            "size": "xl",
            "wrap": true,
            "color": "#FFFFFF",
        })];

        if !content.tags.is_empty() {
            let chips: Vec<Value> = content
                .tags
                .iter()
                .take(MAX_TAGS)
                .map(|tag| self.tag_chip(tag))
                .collect();
            body.push(json!({
                "type": "box",
                "layout": "horizontal",
                "contents": chips,
                "spacing": "sm",
                "margin": "lg",
            }));
        }

        body.push(json!({
            "type": "text",
            "text": self.format_timestamp(content.published_at),
            "wrap": true,
            "size": "sm",
            "color": MUTED,
            "margin": "lg",
        }));

        if !content.summary.is_empty() {
            body.push(json!({
                "type": "box",
                "layout": "vertical",
                "margin": "lg",
                "spacing": "sm",
                "contents": [
                    { "type": "text", "text": "Summary", "color": MUTED, "size": "sm", "flex": 0 },
                    {
                        "type": "text",
                        "text": content.summary,
                        "wrap": true,
                        "size": "sm",
                        "margin": "md",
                        "color": "#E2E8F0",
                    },
                ],
            }));
        }

        if let Some(quiz) = content.quiz.filter(|q| q.is_valid()) {
            body.extend(quiz_block(quiz));
        }

        let mut bubble = json!({
            "type": "bubble",
            "styles": {
                "header": { "backgroundColor": HEADER_BG },
                "body": { "backgroundColor": BODY_BG },
                "footer": { "backgroundColor": BODY_BG, "separator": true, "separatorColor": CHIP_BG },
            },
            "header": {
                "type": "box",
                "layout": "vertical",
                "paddingAll": "12px",
                "contents": [{
                    "type": "text",
                    "text": format!("[ {} ]", content.label),
                    "weight": "bold",
                    "color": ACCENT,
                    "size": "sm",
                }],
            },
            "body": {
                "type": "box",
                "layout": "vertical",
                "spacing": "md",
                "contents": body,
            },
            "footer": {
                "type": "box",
                "layout": "vertical",
                "spacing": "sm",
                "flex": 0,
                "contents": [{
                    "type": "button",
                    "action": { "type": "uri", "label": "記事を読む", "uri": content.url },
                    "style": "primary",
                    "height": "sm",
                    "color": CHIP_BG,
                }],
            },
        });

        if let Some(image) = hero_image(content.image_url, content.default_image_url) {
            bubble["hero"] = json!({
                "type": "image",
                "url": image,
                "size": "full",
                "aspectRatio": "20:13",
                "aspectMode": "cover",
            });
        }

        bubble
    }

    fn tag_chip(&self, tag: &str) -> Value {
        json!({
            "type": "box",
            "layout": "vertical",
            "backgroundColor": CHIP_BG,
            "cornerRadius": "md",
            "paddingAll": "6px",
            "contents": [{
                "type": "text",
                "text": tag,
                "color": "#FFFFFF",
                "size": "xs",
                "weight": "bold",
                "align": "center",
            }],
            "action": {
                "type": "message",
                "label": truncate_chars(tag, MAX_LABEL_CHARS),
                "text": format!("{} {}", self.search_keyword, tag),
            },
        })
    }

    /// Alt text shown in notifications: `[tag1][tag2] 【label】title`.
    pub fn alt_text(label: &str, title: &str, tags: &[String]) -> String {
        let tag_prefix = if tags.is_empty() {
            String::new()
        } else {
            format!("[{}] ", tags.join("]["))
        };
        truncate_chars(&format!("{}【{}】{}", tag_prefix, label, title), MAX_ALT_TEXT_CHARS)
    }

    pub fn flex(alt_text: &str, contents: Value) -> Value {
        json!({
            "type": "flex",
            "altText": truncate_chars(alt_text, MAX_ALT_TEXT_CHARS),
            "contents": contents,
        })
    }

    /// Wraps up to ten bubbles; extra bubbles are dropped.
    pub fn carousel(alt_text: &str, bubbles: Vec<Value>) -> Value {
        let bubbles: Vec<Value> = bubbles.into_iter().take(MAX_CAROUSEL_BUBBLES).collect();
        Self::flex(alt_text, json!({ "type": "carousel", "contents": bubbles }))
    }

    pub fn digest_bubble(&self, overview: &str, entries: &[DigestEntry], today: NaiveDate) -> Value {
        let mut body = vec![
            json!({ "type": "text", "text": overview, "wrap": true, "size": "sm", "color": "#E2E8F0" }),
            json!({ "type": "separator", "margin": "xl" }),
            json!({
                "type": "text",
                "text": format!("今週の記事一覧 (全{}件)", entries.len()),
                "size": "xs",
                "color": MUTED,
                "margin": "lg",
            }),
        ];

        for entry in entries {
            body.push(json!({
                "type": "box",
                "layout": "horizontal",
                "margin": "lg",
                "contents": [
                    { "type": "text", "text": "●", "size": "xs", "color": ACCENT, "flex": 0, "margin": "sm" },
                    {
                        "type": "text",
                        "text": entry.title,
                        "wrap": true,
                        "size": "sm",
                        "color": "#FFFFFF",
                        "action": { "type": "uri", "label": "記事を読む", "uri": entry.url },
                    },
                ],
            }));
        }

        json!({
            "type": "bubble",
            "styles": {
                "header": { "backgroundColor": HEADER_BG },
                "body": { "backgroundColor": BODY_BG },
            },
            "header": {
                "type": "box",
                "layout": "vertical",
                "paddingAll": "12px",
                "contents": [
                    { "type": "text", "text": "【🤖 週間テックサマリー】", "weight": "bold", "color": ACCENT, "size": "lg" },
                    { "type": "text", "text": digest_period(today), "color": MUTED, "size": "sm", "margin": "md" },
                ],
            },
            "body": {
                "type": "box",
                "layout": "vertical",
                "spacing": "md",
                "contents": body,
            },
        })
    }
}

fn quiz_block(quiz: &Quiz) -> Vec<Value> {
    let correct_answer = quiz.correct_answer().unwrap_or_default();

    let buttons: Vec<Value> = quiz
        .options
        .iter()
        .enumerate()
        .map(|(index, option)| {
            let is_correct = index == quiz.correct_index;
            let payload = QuizAnswer {
                is_correct,
                correct_answer: (!is_correct).then(|| correct_answer.to_string()),
            };
            let label = truncate_chars(option, MAX_LABEL_CHARS);
            json!({
                "type": "button",
                "action": {
                    "type": "postback",
                    "label": label,
                    "data": payload.encode(),
                    "displayText": label,
                },
                "style": "secondary",
                "height": "sm",
                "margin": "sm",
            })
        })
        .collect();

    vec![
        json!({ "type": "separator", "margin": "xl" }),
        json!({ "type": "text", "text": "今日のテッククイズ💡", "weight": "bold", "size": "md", "margin": "lg", "color": ACCENT }),
        json!({ "type": "text", "text": quiz.question, "wrap": true, "size": "sm", "color": "#E2E8F0", "margin": "md" }),
        json!({ "type": "box", "layout": "vertical", "spacing": "sm", "margin": "md", "contents": buttons }),
    ]
}

/// "previous Monday - today", Monday itself reaching back a full week.
fn digest_period(today: NaiveDate) -> String {
    let days_back = match today.weekday().num_days_from_monday() {
        0 => 7,
        n => i64::from(n),
    };
    let start = today - Duration::days(days_back);
    format!("{} - {}", start.format("%Y/%m/%d"), today.format("%Y/%m/%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::postback::QuizAnswer;
    use chrono::TimeZone;

    fn composer() -> Composer {
        Composer::new("最新情報", 9)
    }

    fn content<'a>(tags: &'a [String], quiz: Option<&'a Quiz>) -> BubbleContent<'a> {
        BubbleContent {
            label: "Rust Blog",
            title: "Announcing Rust",
            url: "https://blog.example.com/rust",
            tags,
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 1, 30, 0).unwrap(),
            summary: "A summary.",
            quiz,
            image_url: None,
            default_image_url: None,
        }
    }

    fn quiz(options: &[&str], correct_index: usize) -> Quiz {
        Quiz {
            question: "Which?".to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_index,
        }
    }

    fn body_texts(bubble: &Value) -> Vec<String> {
        bubble["body"]["contents"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["text"].as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn contains_title_timestamp_summary_and_link() {
        let bubble = composer().bubble(&content(&[], None));
        let texts = body_texts(&bubble);
        assert_eq!(texts[0], "Announcing Rust");
        assert!(texts.contains(&"2024/05/01 10:30".to_string()));
        assert_eq!(bubble["header"]["contents"][0]["text"], "[ Rust Blog ]");
        assert_eq!(
            bubble["footer"]["contents"][0]["action"]["uri"],
            "https://blog.example.com/rust"
        );
        assert_eq!(bubble["body"]["contents"][2]["contents"][1]["text"], "A summary.");
    }

    #[test]
    fn empty_summary_omits_block() {
        let tags: Vec<String> = vec![];
        let mut c = content(&tags, None);
        c.summary = "";
        let bubble = composer().bubble(&c);
        assert_eq!(bubble["body"]["contents"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn tag_chips_issue_search_commands() {
        let tags = vec!["AI".to_string(), "クラウド".to_string()];
        let bubble = composer().bubble(&content(&tags, None));
        let chips = bubble["body"]["contents"][1]["contents"].as_array().unwrap();
        assert_eq!(chips.len(), 2);
        assert_eq!(chips[0]["action"]["text"], "最新情報 AI");
        assert_eq!(chips[1]["action"]["text"], "最新情報 クラウド");
    }

    #[test]
    fn two_option_quiz_is_not_rendered() {
        let q = quiz(&["a", "b"], 0);
        let bubble = composer().bubble(&content(&[], Some(&q)));
        let rendered = bubble.to_string();
        assert!(!rendered.contains("postback"));
        assert!(!rendered.contains("今日のテッククイズ"));
    }

    #[test]
    fn out_of_range_quiz_is_not_rendered() {
        let q = quiz(&["a", "b", "c"], 3);
        let bubble = composer().bubble(&content(&[], Some(&q)));
        assert!(!bubble.to_string().contains("postback"));
    }

    #[test]
    fn valid_quiz_buttons_encode_correctness() {
        let q = quiz(&["a", "b", "c"], 1);
        let bubble = composer().bubble(&content(&[], Some(&q)));
        let contents = bubble["body"]["contents"].as_array().unwrap();
        let buttons = contents.last().unwrap()["contents"].as_array().unwrap();
        assert_eq!(buttons.len(), 3);

        let answers: Vec<QuizAnswer> = buttons
            .iter()
            .map(|b| QuizAnswer::decode(b["action"]["data"].as_str().unwrap()).unwrap())
            .collect();
        assert!(!answers[0].is_correct);
        assert_eq!(answers[0].correct_answer.as_deref(), Some("b"));
        assert!(answers[1].is_correct);
        assert_eq!(answers[1].correct_answer, None);
        assert_eq!(buttons[2]["action"]["displayText"], "c");
    }

    #[test]
    fn hero_falls_back_to_feed_default() {
        let tags: Vec<String> = vec![];
        let mut c = content(&tags, None);
        c.image_url = Some("not a url");
        c.default_image_url = Some("https://cdn.example.com/default.png");
        let bubble = composer().bubble(&c);
        assert_eq!(bubble["hero"]["url"], "https://cdn.example.com/default.png");
    }

    #[test]
    fn hero_is_omitted_without_any_valid_image() {
        let tags: Vec<String> = vec![];
        let mut c = content(&tags, None);
        let long = format!("https://cdn.example.com/{}", "a".repeat(MAX_IMAGE_URL_LEN));
        c.image_url = Some(long.as_str());
        c.default_image_url = Some("ftp//broken");
        let bubble = composer().bubble(&c);
        assert!(bubble.get("hero").is_none());
    }

    #[test]
    fn enriched_image_wins_when_valid() {
        assert_eq!(
            hero_image(Some("https://a.example/i.png"), Some("https://b.example/d.png")),
            Some("https://a.example/i.png")
        );
        assert_eq!(hero_image(None, None), None);
    }

    #[test]
    fn carousel_truncates_to_ten() {
        let bubbles = (0..15).map(|i| json!({ "type": "bubble", "n": i })).collect();
        let message = Composer::carousel("alt", bubbles);
        let contents = message["contents"]["contents"].as_array().unwrap();
        assert_eq!(contents.len(), MAX_CAROUSEL_BUBBLES);
        assert_eq!(contents[0]["n"], 0);
        assert_eq!(message["contents"]["type"], "carousel");
    }

    #[test]
    fn alt_text_lists_tags() {
        let tags = vec!["AI".to_string(), "Web開発".to_string()];
        assert_eq!(
            Composer::alt_text("Blog", "Title", &tags),
            "[AI][Web開発] 【Blog】Title"
        );
        assert_eq!(Composer::alt_text("Blog", "Title", &[]), "【Blog】Title");
    }

    #[test]
    fn digest_period_starts_on_previous_monday() {
        let wednesday = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();
        assert_eq!(digest_period(wednesday), "2024/05/06 - 2024/05/08");
        let monday = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(digest_period(monday), "2024/04/29 - 2024/05/06");
    }

    #[test]
    fn digest_bubble_lists_entries() {
        let entries = vec![DigestEntry {
            title: "Post".to_string(),
            url: "https://blog.example.com/post".to_string(),
            summary: "s".to_string(),
            tags: vec![],
            source: "Blog".to_string(),
            date: "2024-05-01".to_string(),
        }];
        let bubble = composer().digest_bubble(
            "overview",
            &entries,
            NaiveDate::from_ymd_opt(2024, 5, 8).unwrap(),
        );
        let contents = bubble["body"]["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 4);
        assert_eq!(contents[2]["text"], "今週の記事一覧 (全1件)");
        assert_eq!(
            contents[3]["contents"][1]["action"]["uri"],
            "https://blog.example.com/post"
        );
    }
}
