//! AI adapters: the chat-completion client and the budget insights service.
//!
//! Model failures never fail a request; the service falls back to the local
//! heuristic summary.

pub mod budget_insights;
pub mod llm_client;

pub use budget_insights::{BudgetInsightsService, InsightsReport, InsightsSource, LlmBudgetInsights};
pub use llm_client::{LlmConfig, LlmError, OpenAiCompatibleClient};
