//! Token usage tracking.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Token usage reported for a generation, a step or a whole stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens produced by the model.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens, when the provider reports it separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl Usage {
    /// Create usage from prompt and completion counts.
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: None,
        }
    }

    /// Set the reported total.
    #[must_use]
    pub fn with_total_tokens(mut self, total: u64) -> Self {
        self.total_tokens = Some(total);
        self
    }

    /// Total tokens, falling back to prompt + completion.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total_tokens
            .unwrap_or(self.prompt_tokens + self.completion_tokens)
    }

    /// Whether no tokens were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens.is_none()
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(mut self, rhs: Usage) -> Usage {
        self += rhs;
        self
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens = match (self.total_tokens, rhs.total_tokens) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_assign() {
        let mut usage = Usage::new(10, 5);
        usage += Usage::new(3, 2).with_total_tokens(5);
        assert_eq!(usage.prompt_tokens, 13);
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.total_tokens, Some(5));
    }

    #[test]
    fn test_total_fallback() {
        assert_eq!(Usage::new(10, 5).total(), 15);
        assert_eq!(Usage::new(10, 5).with_total_tokens(20).total(), 20);
    }

    #[test]
    fn test_serialization_is_camel_case() {
        let json = serde_json::to_value(Usage::new(1, 2)).unwrap();
        assert_eq!(json, serde_json::json!({"promptTokens": 1, "completionTokens": 2}));
    }
}
