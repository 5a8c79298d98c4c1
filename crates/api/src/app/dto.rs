//! Request bodies and query strings.
//!
//! Amounts are integer minor units. Identifiers arrive as strings and are
//! parsed by the handlers so a malformed id is a 400, not a body rejection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use sitebook_auth::Role;
use sitebook_core::Money;
use sitebook_ledger::{TransactionKind, TransactionStatus};
use sitebook_projects::{ProjectStatus, TaskStatus};
use sitebook_workforce::{AttendanceStatus, PaymentType};

// Users

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Self-registration: the role comes from the caller's token.
#[derive(Debug, Deserialize)]
pub struct RegisterSelfRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

// Projects

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub location: String,
    pub budget_limit: Money,
    pub order_value: Money,
    pub manager_id: String,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: String,
    pub location: String,
    pub budget_limit: Money,
    pub order_value: Money,
}

#[derive(Debug, Deserialize)]
pub struct ChangeProjectStatusRequest {
    pub status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignManagerRequest {
    pub manager_id: String,
}

// Transactions

#[derive(Debug, Deserialize)]
pub struct RecordExpenseRequest {
    pub amount: Money,
    pub category: String,
    pub description: String,
    /// When the money was spent; defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RecordIncomeRequest {
    pub amount: Money,
    #[serde(default)]
    pub category: Option<String>,
    pub description: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub project_id: Option<String>,
    pub worker_id: Option<String>,
}

// Attendance

#[derive(Debug, Deserialize)]
pub struct AttendanceEntryRequest {
    pub worker_id: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub units_worked: u32,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub date: NaiveDate,
    pub entries: Vec<AttendanceEntryRequest>,
}

// Tasks

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_completion_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_completion_date: Option<NaiveDate>,
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct ChangeTaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub project_id: Option<String>,
    pub status: Option<TaskStatus>,
}

// Workers and payroll

#[derive(Debug, Deserialize)]
pub struct WorkerRequest {
    pub name: String,
    pub skill: String,
    pub phone: String,
    pub payment_type: PaymentType,
    pub base_rate: Money,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub amount: Money,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub amount: Money,
    #[serde(default)]
    pub description: Option<String>,
}

/// Start a pay cycle. Without `worker_ids` every worker on the roster is
/// credited with their base rate.
#[derive(Debug, Default, Deserialize)]
pub struct AccrueRequest {
    #[serde(default)]
    pub worker_ids: Option<Vec<String>>,
}
