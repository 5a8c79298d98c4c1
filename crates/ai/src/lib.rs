//! `sitebook-ai`
//!
//! Budget insights: a text summary of how a project is spending against its
//! budget. Jobs read snapshots handed to them by callers and never touch
//! domain state. The remote model client lives in `sitebook-infra`; this
//! crate holds the deterministic summariser it falls back to.

pub mod budget_insights;
pub mod job;
pub mod result;

pub use budget_insights::{
    render_prompt, BudgetFigures, BudgetInsightsInput, BudgetInsightsJob, BudgetInsightsOutput,
    BudgetRisk, BudgetTransaction, BudgetTransactionKind, CategoryTotal, MAX_SUMMARY_CHARS,
};
pub use job::AiJob;
pub use result::{AiError, AiResult};
