//! Safety interception.
//!
//! A classifier inspects the raw user utterance and either stays silent or
//! returns a supportive crisis response that replaces the normal reply.
//! Classifier failures are never treated as a trigger.

use std::sync::Arc;

use async_trait::async_trait;
use regex::RegexSet;

use super::errors::SafetyError;
use super::types::Message;
use crate::inference::{LanguageModel, ModelRequest};

/// Synthetic input sent when a session opens. Never classified.
pub const SESSION_START_SENTINEL: &str = "[SESSION_START]";

pub fn is_session_start(input: &str) -> bool {
    input.trim() == SESSION_START_SENTINEL
}

/// Default crisis response.
pub const CRISIS_RESPONSE: &str = "I'm really glad you told me, and I'm sorry you're carrying \
this right now. You don't have to go through it alone. If you're in the US you can call or text \
988 (Suicide & Crisis Lifeline) any time, or text HOME to 741741 to reach the Crisis Text Line. \
Outside the US, findahelpline.com lists free, confidential services near you. If you are in \
immediate danger, please call your local emergency number. I'm here to keep talking with you.";

/// Classifies user input for high-risk content.
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    /// `Ok(None)` means no intervention; `Ok(Some(text))` replaces the reply.
    async fn check(&self, input: &str) -> Result<Option<String>, SafetyError>;
}

// ─── Keyword classifier ─────────────────────────────────────────────────────

const CRISIS_PATTERNS: &[&str] = &[
    r"(?i)\b(kill|hurt|harm|cut)(ing)?\s+myself\b",
    r"(?i)\bsuicid(e|al)\b",
    r"(?i)\bend(ing)?\s+(my\s+life|it\s+all)\b",
    r"(?i)\bwant(ed)?\s+to\s+die\b",
    r"(?i)\b(want|going)\s+to\s+give\s+up\b",
    r"(?i)\bno\s+(reason|point)\s+(to|in)\s+(live|living)\b",
    r"(?i)\bself[-\s]?harm",
    r"(?i)\bbetter\s+off\s+(dead|without\s+me)\b",
    r"(?i)\bdon'?t\s+want\s+to\s+(be\s+here|wake\s+up)\b",
];

/// Regex-based classifier; cheap enough to run on every turn.
pub struct KeywordSafetyClassifier {
    patterns: RegexSet,
    response: String,
}

impl KeywordSafetyClassifier {
    pub fn new() -> Result<Self, SafetyError> {
        Self::with_patterns(CRISIS_PATTERNS, CRISIS_RESPONSE)
    }

    pub fn with_patterns(patterns: &[&str], response: &str) -> Result<Self, SafetyError> {
        let patterns = RegexSet::new(patterns).map_err(|e| SafetyError::ClassifierFailed {
            reason: format!("invalid pattern: {e}"),
        })?;
        Ok(Self {
            patterns,
            response: response.to_string(),
        })
    }
}

#[async_trait]
impl SafetyClassifier for KeywordSafetyClassifier {
    async fn check(&self, input: &str) -> Result<Option<String>, SafetyError> {
        if self.patterns.is_match(input) {
            Ok(Some(self.response.clone()))
        } else {
            Ok(None)
        }
    }
}

// ─── Model classifier ───────────────────────────────────────────────────────

const CLASSIFIER_PROMPT: &str = "You are a safety classifier. Decide whether the user's message \
indicates risk of self-harm, suicide or an acute crisis. Answer with exactly one word: \
UNSAFE or SAFE.";

/// Asks a language model for a SAFE/UNSAFE verdict.
pub struct ModelSafetyClassifier {
    model: Arc<dyn LanguageModel>,
    response: String,
}

impl ModelSafetyClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            response: CRISIS_RESPONSE.to_string(),
        }
    }
}

#[async_trait]
impl SafetyClassifier for ModelSafetyClassifier {
    async fn check(&self, input: &str) -> Result<Option<String>, SafetyError> {
        let request = ModelRequest {
            system_prompt: CLASSIFIER_PROMPT.to_string(),
            messages: vec![Message::user(input)],
            tools: Vec::new(),
            temperature: Some(0.0),
        };
        let response = self
            .model
            .complete(request)
            .await
            .map_err(|e| SafetyError::ClassifierFailed {
                reason: e.to_string(),
            })?;

        let verdict = response.content.unwrap_or_default();
        let verdict = verdict.trim().to_ascii_uppercase();
        if verdict.starts_with("UNSAFE") {
            Ok(Some(self.response.clone()))
        } else if verdict.starts_with("SAFE") {
            Ok(None)
        } else {
            Err(SafetyError::ClassifierFailed {
                reason: format!("unexpected verdict: {verdict}"),
            })
        }
    }
}
