//! Typed-answer matching.
//!
//! Both the expected answer and the user's input go through the same
//! normalization pipeline before being compared for equality.

use crate::MatcherConfig;

/// Compares a typed answer against the back of a card
#[derive(Clone, Debug, Default)]
pub struct AnswerMatcher {
    config: MatcherConfig,
}

impl From<&MatcherConfig> for AnswerMatcher {
    fn from(config: &MatcherConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl AnswerMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn matches(&self, expected: &str, given: &str) -> bool {
        self.normalize(expected) == self.normalize(given)
    }

    /// Apply the enabled steps in a fixed order:
    /// trim, collapse whitespace, lowercase, strip accents, drop non-letters
    pub fn normalize(&self, input: &str) -> String {
        let mut text = input.to_string();
        if self.config.trim_whitespace {
            text = text.trim().to_string();
        }
        if self.config.normalize_whitespace {
            text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        if self.config.ignore_case {
            text = text.to_lowercase();
        }
        if self.config.ignore_accents {
            text = deunicode::deunicode(&text);
        }
        if self.config.ignore_nonalphabetic {
            text.retain(char::is_alphabetic);
        }
        text
    }
}
