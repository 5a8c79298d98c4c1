use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitebook_core::{
    require_text, Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId,
};
use sitebook_events::Event;
use sitebook_projects::ProjectId;

/// Transaction identifier. Payroll transactions share this id space with
/// project transactions so the transaction list can merge both.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub AggregateId);

impl TransactionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Expense,
    Income,
    PayoutAdvance,
    PayoutSettlement,
    SalarySettlement,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Expense => "expense",
            TransactionKind::Income => "income",
            TransactionKind::PayoutAdvance => "payout_advance",
            TransactionKind::PayoutSettlement => "payout_settlement",
            TransactionKind::SalarySettlement => "salary_settlement",
        }
    }

    /// Advances, settlements and salaries are written by the payroll ledger.
    pub fn is_payroll(self) -> bool {
        matches!(
            self,
            TransactionKind::PayoutAdvance
                | TransactionKind::PayoutSettlement
                | TransactionKind::SalarySettlement
        )
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation state. Only expenses start out `unapproved`; everything else
/// is recorded as `approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Unapproved,
    Approved,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Unapproved => "unapproved",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_INCOME_CATEGORY: &str = "Client Payment";

/// Aggregate root: ProjectTransaction (an expense or an income entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTransaction {
    id: TransactionId,
    tenant_id: Option<TenantId>,
    project_id: Option<ProjectId>,
    kind: TransactionKind,
    amount: Money,
    status: TransactionStatus,
    version: u64,
    created: bool,
    deleted: bool,
}

impl ProjectTransaction {
    pub fn empty(id: TransactionId) -> Self {
        Self {
            id,
            tenant_id: None,
            project_id: None,
            kind: TransactionKind::Expense,
            amount: Money::ZERO,
            status: TransactionStatus::Unapproved,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn ensure_live(&self, tenant_id: TenantId) -> Result<ProjectId, DomainError> {
        let project_id = match (self.created, self.deleted, self.project_id) {
            (true, false, Some(project_id)) => project_id,
            _ => return Err(DomainError::NotFound),
        };
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(project_id)
    }

    fn ensure_pending_expense(&self) -> Result<(), DomainError> {
        if self.kind != TransactionKind::Expense {
            return Err(DomainError::invariant("only expenses go through approval"));
        }
        if self.status != TransactionStatus::Unapproved {
            return Err(DomainError::invariant("transaction has already been processed"));
        }
        Ok(())
    }
}

impl AggregateRoot for ProjectTransaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// Commands

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExpense {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIncome {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    pub amount: Money,
    /// Defaults to "Client Payment".
    pub category: Option<String>,
    pub description: String,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveExpense {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectExpense {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub rejected_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTransaction {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionCommand {
    RecordExpense(RecordExpense),
    RecordIncome(RecordIncome),
    Approve(ApproveExpense),
    Reject(RejectExpense),
    Delete(DeleteTransaction),
}

// Events

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecorded {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeRecorded {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Approval and rejection repeat the project and amount so read models can
/// update project totals without looking the transaction up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseApproved {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    pub amount: Money,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRejected {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    pub amount: Money,
    pub rejected_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDeleted {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    pub kind: TransactionKind,
    pub amount: Money,
    /// Status at the time of deletion.
    pub status: TransactionStatus,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEvent {
    ExpenseRecorded(ExpenseRecorded),
    IncomeRecorded(IncomeRecorded),
    Approved(ExpenseApproved),
    Rejected(ExpenseRejected),
    Deleted(TransactionDeleted),
}

impl Event for TransactionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransactionEvent::ExpenseRecorded(_) => "ledger.transaction.expense_recorded",
            TransactionEvent::IncomeRecorded(_) => "ledger.transaction.income_recorded",
            TransactionEvent::Approved(_) => "ledger.transaction.approved",
            TransactionEvent::Rejected(_) => "ledger.transaction.rejected",
            TransactionEvent::Deleted(_) => "ledger.transaction.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransactionEvent::ExpenseRecorded(e) => e.occurred_at,
            TransactionEvent::IncomeRecorded(e) => e.occurred_at,
            TransactionEvent::Approved(e) => e.occurred_at,
            TransactionEvent::Rejected(e) => e.occurred_at,
            TransactionEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ProjectTransaction {
    type Command = TransactionCommand;
    type Event = TransactionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransactionEvent::ExpenseRecorded(e) => {
                self.id = e.transaction_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.kind = TransactionKind::Expense;
                self.amount = e.amount;
                self.status = TransactionStatus::Unapproved;
                self.created = true;
            }
            TransactionEvent::IncomeRecorded(e) => {
                self.id = e.transaction_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.kind = TransactionKind::Income;
                self.amount = e.amount;
                self.status = TransactionStatus::Approved;
                self.created = true;
            }
            TransactionEvent::Approved(_) => self.status = TransactionStatus::Approved,
            TransactionEvent::Rejected(_) => self.status = TransactionStatus::Rejected,
            TransactionEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransactionCommand::RecordExpense(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("transaction already exists"));
                }
                Ok(vec![TransactionEvent::ExpenseRecorded(ExpenseRecorded {
                    tenant_id: cmd.tenant_id,
                    transaction_id: cmd.transaction_id,
                    project_id: cmd.project_id,
                    amount: Money::positive("amount", cmd.amount.minor_units())?,
                    category: require_text("category", &cmd.category)?,
                    description: require_text("description", &cmd.description)?,
                    created_by: cmd.created_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransactionCommand::RecordIncome(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("transaction already exists"));
                }
                let category = match cmd.category.as_deref().map(str::trim) {
                    Some(c) if !c.is_empty() => c.to_string(),
                    _ => DEFAULT_INCOME_CATEGORY.to_string(),
                };
                Ok(vec![TransactionEvent::IncomeRecorded(IncomeRecorded {
                    tenant_id: cmd.tenant_id,
                    transaction_id: cmd.transaction_id,
                    project_id: cmd.project_id,
                    amount: Money::positive("amount", cmd.amount.minor_units())?,
                    category,
                    description: require_text("description", &cmd.description)?,
                    created_by: cmd.created_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransactionCommand::Approve(cmd) => {
                let project_id = self.ensure_live(cmd.tenant_id)?;
                self.ensure_pending_expense()?;
                Ok(vec![TransactionEvent::Approved(ExpenseApproved {
                    tenant_id: cmd.tenant_id,
                    transaction_id: cmd.transaction_id,
                    project_id,
                    amount: self.amount,
                    approved_by: cmd.approved_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransactionCommand::Reject(cmd) => {
                let project_id = self.ensure_live(cmd.tenant_id)?;
                self.ensure_pending_expense()?;
                Ok(vec![TransactionEvent::Rejected(ExpenseRejected {
                    tenant_id: cmd.tenant_id,
                    transaction_id: cmd.transaction_id,
                    project_id,
                    amount: self.amount,
                    rejected_by: cmd.rejected_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransactionCommand::Delete(cmd) => {
                let project_id = self.ensure_live(cmd.tenant_id)?;
                Ok(vec![TransactionEvent::Deleted(TransactionDeleted {
                    tenant_id: cmd.tenant_id,
                    transaction_id: cmd.transaction_id,
                    project_id,
                    kind: self.kind,
                    amount: self.amount,
                    status: self.status,
                    deleted_by: cmd.deleted_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
