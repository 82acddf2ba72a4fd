//! Heuristic task classification
//!
//! Keyword rules run in a fixed order (multimodal, complex, reasoning) and
//! the first match wins. Prompts matching none fall back to size thresholds:
//! estimated tokens first, then raw length.

use std::sync::LazyLock;

use regex::Regex;
use switchyard_config::ClassifierConfig;
use switchyard_core::Category;
use tiktoken_rs::{CoreBPE, o200k_base};

static TOKENIZER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| o200k_base().ok());

static MULTIMODAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:visuali[sz]|diagram|chart|image|screenshot)").expect("must be valid regex")
});

static COMPLEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:review|architecture|design\s+pattern|refactor|optimi[sz]|comprehensive)")
        .expect("must be valid regex")
});

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:debug|test|unit\s+test|algorithm|logic|calculat)").expect("must be valid regex")
});

/// Estimate token count using tiktoken, falling back to four bytes per token
pub fn estimate_tokens(text: &str) -> usize {
    TOKENIZER
        .as_ref()
        .map_or_else(|| text.len() / 4, |bpe| bpe.encode_with_special_tokens(text).len())
}

/// Assigns prompts to a [`Category`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskClassifier {
    thresholds: ClassifierConfig,
}

impl TaskClassifier {
    pub const fn new(thresholds: ClassifierConfig) -> Self {
        Self { thresholds }
    }

    /// Classify a prompt given the estimated token count of the whole request
    pub fn classify(&self, prompt: &str, estimated_tokens: usize) -> Category {
        if MULTIMODAL_RE.is_match(prompt) {
            return Category::Multimodal;
        }
        if COMPLEX_RE.is_match(prompt) {
            return Category::Complex;
        }
        if REASONING_RE.is_match(prompt) {
            return Category::Reasoning;
        }

        let t = &self.thresholds;

        if estimated_tokens > t.complex_tokens {
            Category::Complex
        } else if estimated_tokens > t.reasoning_tokens {
            Category::Reasoning
        } else if prompt.chars().count() < t.simple_chars {
            Category::Simple
        } else if prompt.chars().count() < t.reasoning_chars {
            Category::Reasoning
        } else {
            Category::Complex
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(prompt: &str) -> Category {
        TaskClassifier::default().classify(prompt, estimate_tokens(prompt))
    }

    #[test]
    fn visual_intent_wins_over_everything() {
        assert_eq!(classify("Review this architecture diagram"), Category::Multimodal);
        assert_eq!(classify("Can you visualise the call graph?"), Category::Multimodal);
        assert_eq!(classify("Describe the SCREENSHOT"), Category::Multimodal);
    }

    #[test]
    fn complex_keywords_beat_reasoning_keywords() {
        assert_eq!(classify("Refactor and test this module"), Category::Complex);
        assert_eq!(classify("Please optimize the query planner"), Category::Complex);
        assert_eq!(classify("what design patterns fit here"), Category::Complex);
    }

    #[test]
    fn reasoning_keywords() {
        assert_eq!(classify("debug this panic"), Category::Reasoning);
        assert_eq!(classify("write unit tests for the parser"), Category::Reasoning);
        assert_eq!(classify("calculate the checksum"), Category::Reasoning);
    }

    #[test]
    fn keywords_match_at_word_starts_only() {
        // "latest" and "contest" must not read as "test"
        assert_eq!(classify("what is the latest contest result"), Category::Simple);
    }

    #[test]
    fn falls_back_to_size() {
        assert_eq!(classify("hello there"), Category::Simple);
        assert_eq!(classify(&"a".repeat(150)), Category::Reasoning);
        assert_eq!(classify(&"word ".repeat(120)), Category::Complex);
    }

    #[test]
    fn large_token_counts_escalate() {
        let classifier = TaskClassifier::default();
        assert_eq!(classifier.classify("hi", 5_001), Category::Reasoning);
        assert_eq!(classifier.classify("hi", 10_001), Category::Complex);
        assert_eq!(classifier.classify("hi", 5_000), Category::Simple);
    }

    #[test]
    fn thresholds_are_configurable() {
        let classifier = TaskClassifier::new(ClassifierConfig {
            simple_chars: 5,
            ..ClassifierConfig::default()
        });
        assert_eq!(classifier.classify("hello there", 2), Category::Reasoning);
    }

    #[test]
    fn classification_is_idempotent() {
        let classifier = TaskClassifier::default();
        let long = "x".repeat(700);
        for prompt in [
            "",
            "what is rust",
            "debug the scheduler",
            "review my PR",
            "draw a chart",
            long.as_str(),
        ] {
            let tokens = estimate_tokens(prompt);
            let first = classifier.classify(prompt, tokens);
            for _ in 0..5 {
                assert_eq!(classifier.classify(prompt, tokens), first);
            }
        }
    }

    #[test]
    fn token_estimate_is_nonzero_for_text() {
        assert!(estimate_tokens("The quick brown fox jumps over the lazy dog") > 0);
        assert_eq!(estimate_tokens(""), 0);
    }
}
