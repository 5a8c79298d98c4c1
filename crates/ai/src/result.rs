use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Output of an [`AiJob`](crate::AiJob). An insight for display, never a
/// domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResult {
    /// Job-specific score; budget insights report utilisation as a ratio.
    pub score: f64,

    /// In \[0, 1\].
    pub confidence: f64,

    pub explanation: Option<String>,

    pub metadata: JsonValue,
}

impl AiResult {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score,
            confidence: confidence.clamp(0.0, 1.0),
            explanation: None,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("invalid job input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    /// The model answered, but not with a usable `{ "summary" }` object.
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
}
