use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sitebook_ai::{
    render_prompt, AiError, AiJob, BudgetFigures, BudgetInsightsInput, BudgetInsightsJob, BudgetInsightsOutput,
};
use sitebook_core::TenantId;

use super::llm_client::OpenAiCompatibleClient;

const SYSTEM_PROMPT: &str =
    "You summarise construction project finances for site managers. Be brief and concrete.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightsSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsReport {
    #[serde(flatten)]
    pub output: BudgetInsightsOutput,
    pub source: InsightsSource,
    pub figures: BudgetFigures,
}

#[async_trait]
pub trait BudgetInsightsService: Send + Sync {
    async fn summarize(&self, tenant_id: TenantId, input: BudgetInsightsInput) -> Result<InsightsReport, AiError>;
}

/// Asks the configured model for a summary and falls back to the local
/// heuristic when no model is configured or the model call fails.
#[derive(Debug, Clone, Default)]
pub struct LlmBudgetInsights {
    client: Option<OpenAiCompatibleClient>,
}

impl LlmBudgetInsights {
    pub fn new(client: Option<OpenAiCompatibleClient>) -> Self {
        Self { client }
    }

    pub fn heuristic_only() -> Self {
        Self::default()
    }

    async fn ask_model(
        client: &OpenAiCompatibleClient,
        input: &BudgetInsightsInput,
    ) -> Result<BudgetInsightsOutput, AiError> {
        let reply = client
            .complete(SYSTEM_PROMPT, &render_prompt(input))
            .await
            .map_err(|e| AiError::InferenceFailed(e.to_string()))?;
        BudgetInsightsOutput::parse_model_reply(&reply)
    }
}

#[async_trait]
impl BudgetInsightsService for LlmBudgetInsights {
    async fn summarize(&self, tenant_id: TenantId, input: BudgetInsightsInput) -> Result<InsightsReport, AiError> {
        input.validate()?;
        let job = BudgetInsightsJob::new(tenant_id, input);
        let figures = job.figures();

        if let Some(client) = &self.client {
            match Self::ask_model(client, job.input()).await {
                Ok(output) => {
                    info!(model = client.model(), "budget insights produced by model");
                    return Ok(InsightsReport {
                        output,
                        source: InsightsSource::Model,
                        figures,
                    });
                }
                Err(err) => warn!(error = %err, "model summary failed; using heuristic summary"),
            }
        }

        Ok(InsightsReport {
            output: job.summarize()?,
            source: InsightsSource::Heuristic,
            figures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use sitebook_ai::{BudgetTransaction, BudgetTransactionKind};
    use sitebook_core::Money;

    use crate::ai::LlmConfig;

    fn input() -> BudgetInsightsInput {
        BudgetInsightsInput {
            project_id: "p-1".to_string(),
            project_name: Some("Hillside School".to_string()),
            budget_limit: Money::new(100_000),
            transactions: vec![BudgetTransaction {
                id: "t-1".to_string(),
                kind: BudgetTransactionKind::Expense,
                amount: Money::new(85_000),
                category: "Steel".to_string(),
                timestamp: Utc::now(),
                pending: false,
            }],
        }
    }

    #[tokio::test]
    async fn without_a_model_the_heuristic_answers() {
        let report = LlmBudgetInsights::heuristic_only()
            .summarize(TenantId::new(), input())
            .await
            .unwrap();
        assert_eq!(report.source, InsightsSource::Heuristic);
        assert!(!report.output.summary.is_empty());
        assert_eq!(report.figures.approved_expenses, Money::new(85_000));
    }

    #[tokio::test]
    async fn unreachable_model_falls_back_to_heuristic() {
        let client = OpenAiCompatibleClient::new(LlmConfig {
            api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            model: "test-model".to_string(),
            api_key: None,
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let report = LlmBudgetInsights::new(Some(client))
            .summarize(TenantId::new(), input())
            .await
            .unwrap();
        assert_eq!(report.source, InsightsSource::Heuristic);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_call() {
        let mut bad = input();
        bad.budget_limit = Money::ZERO;
        let err = LlmBudgetInsights::heuristic_only()
            .summarize(TenantId::new(), bad)
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::InvalidInput(_)));
    }
}
