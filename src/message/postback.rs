use serde_json::Value;

/// Platform limit for button labels and display texts.
pub const MAX_LABEL_CHARS: usize = 40;
/// Limit for the correct-answer text carried inside a postback payload.
pub const MAX_ANSWER_CHARS: usize = 100;

const QUIZ_ACTION: &str = "quiz_answer";

/// Payload of a quiz answer button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAnswer {
    pub is_correct: bool,
    /// Only carried by wrong-answer buttons.
    pub correct_answer: Option<String>,
}

impl QuizAnswer {
    pub fn encode(&self) -> String {
        let mut pairs = vec![
            ("action", QUIZ_ACTION.to_string()),
            ("is_correct", if self.is_correct { "1" } else { "0" }.to_string()),
        ];
        if let Some(answer) = &self.correct_answer {
            pairs.push(("correct_answer", truncate_chars(answer, MAX_ANSWER_CHARS)));
        }
        // Serializing string pairs cannot fail.
        serde_urlencoded::to_string(&pairs).unwrap_or_default()
    }

    /// `None` when the data is not a quiz answer payload.
    pub fn decode(data: &str) -> Option<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(data).ok()?;
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        if get("action")? != QUIZ_ACTION {
            return None;
        }

        Some(Self {
            is_correct: get("is_correct") == Some("1"),
            correct_answer: get("correct_answer")
                .filter(|answer| !answer.is_empty())
                .map(str::to_string),
        })
    }
}

/// Cut to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Re-apply the current payload limits to every postback action inside a
/// stored message, whatever limits were in force when it was composed.
pub fn sanitize_postbacks(message: &mut Value) {
    match message {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("postback") {
                for field in ["label", "displayText"] {
                    if let Some(Value::String(text)) = map.get_mut(field) {
                        *text = truncate_chars(text, MAX_LABEL_CHARS);
                    }
                }
                if let Some(Value::String(data)) = map.get_mut("data") {
                    if let Some(answer) = QuizAnswer::decode(data) {
                        *data = answer.encode();
                    }
                }
            }
            for value in map.values_mut() {
                sanitize_postbacks(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_postbacks(item);
            }
        }
        _ => {}
    }
}
