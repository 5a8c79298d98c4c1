//! Flat views of ledger events used by the read side.
//!
//! Both aggregates document money movements as transactions. These helpers
//! turn their events into uniform records and into their effect on project
//! totals, so every projection derives totals the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitebook_core::{Money, UserId};
use sitebook_projects::ProjectId;
use sitebook_workforce::WorkerId;

use crate::payroll::PayrollEvent;
use crate::transaction::{TransactionEvent, TransactionId, TransactionKind, TransactionStatus};

pub const ADVANCE_CATEGORY: &str = "Payroll Advance";
pub const SETTLEMENT_CATEGORY: &str = "Payroll Settlement";
pub const SALARY_CATEGORY: &str = "Monthly Salary";

/// One row of the transaction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub project_id: Option<ProjectId>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub worker_id: Option<WorkerId>,
    pub timestamp: DateTime<Utc>,
    pub created_by: UserId,
    pub status: TransactionStatus,
}

/// Change to a project's derived totals caused by one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetEffect {
    pub utilised: i64,
    pub received: i64,
    pub pending_expenses: i64,
}

impl BudgetEffect {
    pub fn is_none(&self) -> bool {
        *self == Self::default()
    }
}

impl TransactionEvent {
    /// Record created by this event, if it creates one.
    pub fn new_record(&self) -> Option<TransactionRecord> {
        match self {
            TransactionEvent::ExpenseRecorded(e) => Some(TransactionRecord {
                id: e.transaction_id,
                project_id: Some(e.project_id),
                kind: TransactionKind::Expense,
                amount: e.amount,
                category: e.category.clone(),
                description: e.description.clone(),
                worker_id: None,
                timestamp: e.occurred_at,
                created_by: e.created_by,
                status: TransactionStatus::Unapproved,
            }),
            TransactionEvent::IncomeRecorded(e) => Some(TransactionRecord {
                id: e.transaction_id,
                project_id: Some(e.project_id),
                kind: TransactionKind::Income,
                amount: e.amount,
                category: e.category.clone(),
                description: e.description.clone(),
                worker_id: None,
                timestamp: e.occurred_at,
                created_by: e.created_by,
                status: TransactionStatus::Approved,
            }),
            _ => None,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        match self {
            TransactionEvent::ExpenseRecorded(e) => e.project_id,
            TransactionEvent::IncomeRecorded(e) => e.project_id,
            TransactionEvent::Approved(e) => e.project_id,
            TransactionEvent::Rejected(e) => e.project_id,
            TransactionEvent::Deleted(e) => e.project_id,
        }
    }

    /// Utilised budget counts approved expenses only; received amount counts
    /// income. Deleting a transaction reverses whatever it contributed.
    pub fn budget_effect(&self) -> BudgetEffect {
        match self {
            TransactionEvent::ExpenseRecorded(e) => BudgetEffect {
                pending_expenses: e.amount.minor_units(),
                ..BudgetEffect::default()
            },
            TransactionEvent::IncomeRecorded(e) => BudgetEffect {
                received: e.amount.minor_units(),
                ..BudgetEffect::default()
            },
            TransactionEvent::Approved(e) => BudgetEffect {
                utilised: e.amount.minor_units(),
                pending_expenses: -e.amount.minor_units(),
                ..BudgetEffect::default()
            },
            TransactionEvent::Rejected(e) => BudgetEffect {
                pending_expenses: -e.amount.minor_units(),
                ..BudgetEffect::default()
            },
            TransactionEvent::Deleted(e) => {
                let amount = e.amount.minor_units();
                match (e.kind, e.status) {
                    (TransactionKind::Expense, TransactionStatus::Approved) => BudgetEffect {
                        utilised: -amount,
                        ..BudgetEffect::default()
                    },
                    (TransactionKind::Expense, TransactionStatus::Unapproved) => BudgetEffect {
                        pending_expenses: -amount,
                        ..BudgetEffect::default()
                    },
                    (TransactionKind::Income, _) => BudgetEffect {
                        received: -amount,
                        ..BudgetEffect::default()
                    },
                    _ => BudgetEffect::default(),
                }
            }
        }
    }
}

impl PayrollEvent {
    /// Transactions documenting this event. Accruals move no money and
    /// produce none.
    pub fn records(&self) -> Vec<TransactionRecord> {
        match self {
            PayrollEvent::WagesAccrued(_) => Vec::new(),
            PayrollEvent::AdvancePaid(e) => vec![TransactionRecord {
                id: e.transaction_id,
                project_id: e.project_id,
                kind: TransactionKind::PayoutAdvance,
                amount: e.amount,
                category: ADVANCE_CATEGORY.to_string(),
                description: e.description.clone(),
                worker_id: Some(e.worker_id),
                timestamp: e.occurred_at,
                created_by: e.recorded_by,
                status: TransactionStatus::Approved,
            }],
            PayrollEvent::PaymentSettled(e) => vec![TransactionRecord {
                id: e.transaction_id,
                project_id: None,
                kind: TransactionKind::PayoutSettlement,
                amount: e.amount,
                category: SETTLEMENT_CATEGORY.to_string(),
                description: e.description.clone(),
                worker_id: Some(e.worker_id),
                timestamp: e.occurred_at,
                created_by: e.settled_by,
                status: TransactionStatus::Approved,
            }],
            PayrollEvent::SalariesPaid(e) => e
                .lines
                .iter()
                .map(|line| TransactionRecord {
                    id: line.transaction_id,
                    project_id: None,
                    kind: TransactionKind::SalarySettlement,
                    amount: line.amount,
                    category: SALARY_CATEGORY.to_string(),
                    description: format!("Salary for {} ({})", e.period, line.worker_name),
                    worker_id: Some(line.worker_id),
                    timestamp: e.occurred_at,
                    created_by: e.paid_by,
                    status: TransactionStatus::Approved,
                })
                .collect(),
        }
    }
}
