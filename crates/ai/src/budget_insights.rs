//! Budget insights for one project.
//!
//! Input mirrors what the model sees: the project's transactions and its
//! budget limit. Output is a single `summary` string, validated before it is
//! shown to anyone.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use sitebook_core::{Money, TenantId};

use crate::job::AiJob;
use crate::result::{AiError, AiResult};

pub const MAX_SUMMARY_CHARS: usize = 2_000;

/// Share of the budget above which spending is flagged.
const ELEVATED_UTILISATION_PCT: f64 = 80.0;

const TOP_CATEGORIES: usize = 3;

/// Longest project or category name quoted in the heuristic summary.
const MAX_NAME_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetTransactionKind {
    Expense,
    Income,
    PayoutAdvance,
    PayoutSettlement,
    SalarySettlement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BudgetTransactionKind,
    pub amount: Money,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    /// Expense still waiting for admin approval.
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetInsightsInput {
    pub project_id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub budget_limit: Money,
    pub transactions: Vec<BudgetTransaction>,
}

impl BudgetInsightsInput {
    pub fn validate(&self) -> Result<(), AiError> {
        if self.project_id.trim().is_empty() {
            return Err(AiError::InvalidInput("project_id is required".to_string()));
        }
        if !self.budget_limit.is_positive() {
            return Err(AiError::InvalidInput("budget_limit must be positive".to_string()));
        }
        if let Some(tx) = self.transactions.iter().find(|t| !t.amount.is_positive()) {
            return Err(AiError::InvalidInput(format!(
                "transaction {} has a non-positive amount",
                tx.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetInsightsOutput {
    pub summary: String,
}

impl BudgetInsightsOutput {
    /// Trim and bound a summary, rejecting empty text.
    pub fn new(summary: impl Into<String>) -> Result<Self, AiError> {
        let out = Self {
            summary: summary.into().trim().to_string(),
        };
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), AiError> {
        if self.summary.trim().is_empty() {
            return Err(AiError::InvalidOutput("summary is empty".to_string()));
        }
        let chars = self.summary.chars().count();
        if chars > MAX_SUMMARY_CHARS {
            return Err(AiError::InvalidOutput(format!(
                "summary is {chars} characters (max {MAX_SUMMARY_CHARS})"
            )));
        }
        Ok(())
    }

    /// Parse a model reply. Accepts the bare JSON object or one wrapped in a
    /// markdown code fence.
    pub fn parse_model_reply(reply: &str) -> Result<Self, AiError> {
        let body = reply.trim();
        let body = body
            .strip_prefix("```json")
            .or_else(|| body.strip_prefix("```"))
            .map(|rest| rest.trim_end().trim_end_matches("```").trim())
            .unwrap_or(body);

        let parsed: BudgetInsightsOutput = serde_json::from_str(body)
            .map_err(|e| AiError::InvalidOutput(format!("expected {{\"summary\": ...}}: {e}")))?;
        Self::new(parsed.summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetRisk {
    Low,
    Elevated,
    Overrun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: Money,
}

/// The numbers behind a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetFigures {
    pub budget_limit: Money,
    pub approved_expenses: Money,
    pub pending_expenses: Money,
    pub income: Money,
    pub payouts: Money,
    pub remaining: Money,
    pub utilisation_pct: f64,
    pub top_categories: Vec<CategoryTotal>,
    pub risk: BudgetRisk,
}

impl BudgetFigures {
    pub fn compute(input: &BudgetInsightsInput) -> Self {
        let mut approved = Money::ZERO;
        let mut pending = Money::ZERO;
        let mut income = Money::ZERO;
        let mut payouts = Money::ZERO;
        let mut by_category: HashMap<&str, Money> = HashMap::new();

        for tx in &input.transactions {
            match tx.kind {
                BudgetTransactionKind::Expense if tx.pending => pending = pending.saturating_add(tx.amount),
                BudgetTransactionKind::Expense => {
                    approved = approved.saturating_add(tx.amount);
                    let slot = by_category.entry(tx.category.trim()).or_insert(Money::ZERO);
                    *slot = slot.saturating_add(tx.amount);
                }
                BudgetTransactionKind::Income => income = income.saturating_add(tx.amount),
                BudgetTransactionKind::PayoutAdvance
                | BudgetTransactionKind::PayoutSettlement
                | BudgetTransactionKind::SalarySettlement => payouts = payouts.saturating_add(tx.amount),
            }
        }

        let mut top_categories: Vec<CategoryTotal> = by_category
            .into_iter()
            .map(|(category, amount)| CategoryTotal {
                category: category.to_string(),
                amount,
            })
            .collect();
        top_categories.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.category.cmp(&b.category)));
        top_categories.truncate(TOP_CATEGORIES);

        let limit = input.budget_limit.minor_units();
        let utilisation_pct = if limit > 0 {
            approved.minor_units() as f64 * 100.0 / limit as f64
        } else {
            0.0
        };

        let risk = if approved > input.budget_limit {
            BudgetRisk::Overrun
        } else if utilisation_pct >= ELEVATED_UTILISATION_PCT
            || approved.saturating_add(pending) > input.budget_limit
        {
            BudgetRisk::Elevated
        } else {
            BudgetRisk::Low
        };

        Self {
            budget_limit: input.budget_limit,
            approved_expenses: approved,
            pending_expenses: pending,
            income,
            payouts,
            remaining: input.budget_limit.saturating_sub(approved),
            utilisation_pct,
            top_categories,
            risk,
        }
    }

    /// Plain-language summary of the figures. Names are shortened so the
    /// text always fits within `MAX_SUMMARY_CHARS`.
    pub fn summary(&self, project: &str) -> String {
        let project = shorten(project, MAX_NAME_CHARS);
        let mut parts = Vec::new();

        if self.approved_expenses.is_zero() && self.pending_expenses.is_zero() {
            parts.push(format!(
                "{project} has no recorded spending yet against a budget of {}.",
                self.budget_limit
            ));
        } else {
            parts.push(format!(
                "{project} has spent {} of its {} budget ({:.1}%).",
                self.approved_expenses, self.budget_limit, self.utilisation_pct
            ));
        }

        if !self.top_categories.is_empty() {
            let cats: Vec<String> = self
                .top_categories
                .iter()
                .map(|c| format!("{} ({})", shorten(&c.category, MAX_NAME_CHARS), c.amount))
                .collect();
            parts.push(format!("Largest spending areas: {}.", cats.join(", ")));
        }

        if self.pending_expenses.is_positive() {
            parts.push(format!(
                "A further {} in expenses is awaiting approval.",
                self.pending_expenses
            ));
        }

        parts.push(match self.risk {
            BudgetRisk::Overrun => format!(
                "The budget is overrun by {}; review remaining commitments.",
                self.approved_expenses.saturating_sub(self.budget_limit)
            ),
            BudgetRisk::Elevated => format!(
                "Only {} remains; spending is close to the limit.",
                self.remaining
            ),
            BudgetRisk::Low => format!("{} remains within budget.", self.remaining),
        });

        if self.income.is_positive() {
            parts.push(format!("Client payments received so far total {}.", self.income));
        }

        parts.join(" ")
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Short instruction sent to the model, asking for `{"summary": ...}`.
pub fn render_prompt(input: &BudgetInsightsInput) -> String {
    let mut out = format!(
        "You are a financial analyst for a construction company. Project {} has a budget limit of {}.\n\
         Transactions:\n",
        input.project_name.as_deref().unwrap_or(&input.project_id),
        input.budget_limit
    );
    for tx in &input.transactions {
        out.push_str(&format!(
            "- ID: {}, Type: {}, Amount: {}, Category: {}, Timestamp: {}{}\n",
            tx.id,
            serde_json::to_value(tx.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            tx.amount,
            tx.category,
            tx.timestamp.to_rfc3339(),
            if tx.pending { " (pending approval)" } else { "" }
        ));
    }
    out.push_str(
        "Give a concise summary of budget health, key spending areas and overrun risk. \
         Reply with JSON only: {\"summary\": \"...\"}",
    );
    out
}

/// Local, deterministic budget insights.
#[derive(Debug, Clone)]
pub struct BudgetInsightsJob {
    tenant_id: TenantId,
    input: BudgetInsightsInput,
}

impl BudgetInsightsJob {
    pub fn new(tenant_id: TenantId, input: BudgetInsightsInput) -> Self {
        Self { tenant_id, input }
    }

    pub fn figures(&self) -> BudgetFigures {
        BudgetFigures::compute(&self.input)
    }

    pub fn summarize(&self) -> Result<BudgetInsightsOutput, AiError> {
        self.input.validate()?;
        let project = self
            .input
            .project_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("The project");
        BudgetInsightsOutput::new(self.figures().summary(project))
    }
}

impl AiJob for BudgetInsightsJob {
    type Input = BudgetInsightsInput;

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<AiResult, AiError> {
        let output = self.summarize()?;
        let figures = self.figures();
        Ok(AiResult::new(figures.utilisation_pct / 100.0, 1.0)
            .with_explanation(output.summary)
            .with_metadata(json!({
                "model": "heuristic",
                "project_id": self.input.project_id,
                "figures": figures,
            })))
    }
}
