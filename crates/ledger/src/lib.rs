//! Ledger domain module (event-sourced).
//!
//! Two aggregates own every amount of money SiteBook tracks:
//!
//! - [`ProjectTransaction`]: one expense or income against a project, with
//!   its moderation state. Project spend is derived from these events only.
//! - [`PayrollLedger`]: one per tenant, holds every worker balance. Each
//!   balance change and the transaction that documents it are one event.

pub mod payroll;
pub mod record;
pub mod transaction;

pub use payroll::{
    salary_transaction_id, AccrueCycleWages, AdvancePaid, PaymentSettled, PayrollCommand, PayrollEvent, PayrollLedger,
    PayrollLedgerId, RecordAdvance, RunMonthlySalaries, SalariesPaid, SalaryLine, SalaryRosterEntry,
    SettlePayment, WageAccrual, WagesAccrued,
};
pub use record::{
    BudgetEffect, TransactionRecord, ADVANCE_CATEGORY, SALARY_CATEGORY, SETTLEMENT_CATEGORY,
};
pub use transaction::{
    ApproveExpense, DeleteTransaction, ExpenseApproved, ExpenseRecorded, ExpenseRejected, IncomeRecorded,
    ProjectTransaction, RecordExpense, RecordIncome, RejectExpense, TransactionCommand, TransactionDeleted,
    TransactionEvent, TransactionId, TransactionKind, TransactionStatus, DEFAULT_INCOME_CATEGORY,
};
