use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl Quiz {
    pub const OPTION_COUNT: usize = 3;

    pub fn is_valid(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.len() == Self::OPTION_COUNT
            && self.correct_index < Self::OPTION_COUNT
    }

    pub fn correct_answer(&self) -> Option<&str> {
        self.options.get(self.correct_index).map(String::as_str)
    }
}

/// Result of the AI analysis of one article. The default value is what
/// callers receive when no analysis could be produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    pub tags: Vec<String>,
    pub quiz: Option<Quiz>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(options: &[&str], correct_index: usize) -> Quiz {
        Quiz {
            question: "Which one?".to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_index,
        }
    }

    #[test]
    fn quiz_requires_three_options() {
        assert!(quiz(&["a", "b", "c"], 0).is_valid());
        assert!(!quiz(&["a", "b"], 0).is_valid());
        assert!(!quiz(&["a", "b", "c", "d"], 0).is_valid());
    }

    #[test]
    fn quiz_requires_index_in_range() {
        assert!(quiz(&["a", "b", "c"], 2).is_valid());
        assert!(!quiz(&["a", "b", "c"], 3).is_valid());
    }

    #[test]
    fn quiz_requires_question() {
        let mut q = quiz(&["a", "b", "c"], 1);
        q.question = "   ".to_string();
        assert!(!q.is_valid());
    }

    #[test]
    fn correct_answer_follows_index() {
        assert_eq!(quiz(&["a", "b", "c"], 1).correct_answer(), Some("b"));
        assert_eq!(quiz(&["a", "b", "c"], 5).correct_answer(), None);
    }
}
