//! Query classification

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Phrases answered with a canned greeting instead of running the QA chain
pub const GREETINGS: &[&str] = &["hi", "hello", "hey", "how are you", "greetings"];

static GREETING_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives = GREETINGS
        .iter()
        .map(|g| regex::escape(g))
        .collect::<Vec<_>>()
        .join("|");
    // Built from a fixed list of escaped literals
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).expect("greeting pattern is valid")
});

/// Kind of incoming question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Small talk, answered without touching the pipeline
    Greeting,
    /// Question for the QA chain
    Question,
}

impl QueryKind {
    /// Classify a question. Greeting words must match on word boundaries.
    pub fn detect(text: &str) -> Self {
        if GREETING_RE.is_match(text) {
            Self::Greeting
        } else {
            Self::Question
        }
    }
}

/// Form body of `POST /`
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionForm {
    pub question: Option<String>,
}
