//! Worker balances, payroll history and salary payout batches.
//!
//! Balances here are folded from the same payroll ledger events as the
//! aggregate, with the same credit/debit rules, so a worker's balance always
//! equals the sum of their unsettled entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use sitebook_core::{Money, TenantId, UserId};
use sitebook_events::EventEnvelope;
use sitebook_ledger::{PayrollEvent, TransactionId};
use sitebook_projects::ProjectId;
use sitebook_workforce::WorkerId;

use super::{decode, ensure_tenant, ProjectionError, StreamCursors, PAYROLL_AGGREGATE};
use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayrollEntryKind {
    Accrual,
    Advance,
    Settlement,
    Salary,
}

/// One balance movement of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollEntry {
    pub kind: PayrollEntryKind,
    /// Signed change to the balance.
    pub amount: Money,
    pub balance_after: Money,
    pub transaction_id: Option<TransactionId>,
    pub project_id: Option<ProjectId>,
    pub description: String,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPayroll {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub balance: Money,
    /// Oldest first.
    pub entries: Vec<PayrollEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidWorker {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub amount_paid: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryPayoutReadModel {
    pub id: Uuid,
    pub period: String,
    pub payout_date: DateTime<Utc>,
    pub total_amount_paid: Money,
    pub paid_by: UserId,
    pub paid_workers: Vec<PaidWorker>,
}

pub struct PayrollProjection<S> {
    store: S,
    payouts: InMemoryTenantStore<Uuid, SalaryPayoutReadModel>,
    cursors: StreamCursors,
}

impl<S> PayrollProjection<S>
where
    S: TenantStore<WorkerId, WorkerPayroll>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            payouts: InMemoryTenantStore::new(),
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PAYROLL_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let event: PayrollEvent = decode(envelope)?;
        match event {
            PayrollEvent::WagesAccrued(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                for accrual in e.accruals {
                    self.post(
                        tenant_id,
                        accrual.worker_id,
                        &accrual.worker_name,
                        PayrollEntryKind::Accrual,
                        accrual.amount,
                        None,
                        None,
                        format!("Wages accrued for {}", accrual.worker_name),
                        e.accrued_by,
                        e.occurred_at,
                    );
                }
            }
            PayrollEvent::AdvancePaid(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.post(
                    tenant_id,
                    e.worker_id,
                    &e.worker_name,
                    PayrollEntryKind::Advance,
                    Money::ZERO.saturating_sub(e.amount),
                    Some(e.transaction_id),
                    e.project_id,
                    e.description,
                    e.recorded_by,
                    e.occurred_at,
                );
            }
            PayrollEvent::PaymentSettled(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.post(
                    tenant_id,
                    e.worker_id,
                    &e.worker_name,
                    PayrollEntryKind::Settlement,
                    Money::ZERO.saturating_sub(e.amount),
                    Some(e.transaction_id),
                    None,
                    e.description,
                    e.settled_by,
                    e.occurred_at,
                );
            }
            PayrollEvent::SalariesPaid(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                for line in &e.lines {
                    self.post(
                        tenant_id,
                        line.worker_id,
                        &line.worker_name,
                        PayrollEntryKind::Salary,
                        Money::ZERO.saturating_sub(line.amount),
                        Some(line.transaction_id),
                        None,
                        format!("Salary for {}", e.period),
                        e.paid_by,
                        e.occurred_at,
                    );
                }
                self.payouts.upsert(
                    tenant_id,
                    e.payout_id,
                    SalaryPayoutReadModel {
                        id: e.payout_id,
                        period: e.period,
                        payout_date: e.occurred_at,
                        total_amount_paid: e.total,
                        paid_by: e.paid_by,
                        paid_workers: e
                            .lines
                            .into_iter()
                            .map(|line| PaidWorker {
                                worker_id: line.worker_id,
                                worker_name: line.worker_name,
                                amount_paid: line.amount,
                            })
                            .collect(),
                    },
                );
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn post(
        &self,
        tenant_id: TenantId,
        worker_id: WorkerId,
        worker_name: &str,
        kind: PayrollEntryKind,
        amount: Money,
        transaction_id: Option<TransactionId>,
        project_id: Option<ProjectId>,
        description: String,
        recorded_by: UserId,
        occurred_at: DateTime<Utc>,
    ) {
        let mut payroll = self.store.get(tenant_id, &worker_id).unwrap_or_else(|| WorkerPayroll {
            worker_id,
            worker_name: worker_name.to_string(),
            balance: Money::ZERO,
            entries: Vec::new(),
        });

        payroll.worker_name = worker_name.to_string();
        payroll.balance = payroll.balance.saturating_add(amount);
        payroll.entries.push(PayrollEntry {
            kind,
            amount,
            balance_after: payroll.balance,
            transaction_id,
            project_id,
            description,
            recorded_by,
            occurred_at,
        });
        self.store.upsert(tenant_id, worker_id, payroll);
    }

    /// Zero for workers with no payroll history.
    pub fn balance(&self, tenant_id: TenantId, worker_id: &WorkerId) -> Money {
        self.store
            .get(tenant_id, worker_id)
            .map(|p| p.balance)
            .unwrap_or(Money::ZERO)
    }

    pub fn worker(&self, tenant_id: TenantId, worker_id: &WorkerId) -> Option<WorkerPayroll> {
        self.store.get(tenant_id, worker_id)
    }

    /// Sum of all positive balances: what the company owes its workers.
    pub fn total_outstanding(&self, tenant_id: TenantId) -> Money {
        self.store
            .list(tenant_id)
            .into_iter()
            .map(|p| p.balance)
            .filter(|b| b.is_positive())
            .sum()
    }

    /// Newest first.
    pub fn salary_payouts(&self, tenant_id: TenantId) -> Vec<SalaryPayoutReadModel> {
        let mut payouts = self.payouts.list(tenant_id);
        payouts.sort_by(|a, b| b.payout_date.cmp(&a.payout_date).then(b.id.cmp(&a.id)));
        payouts
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.payouts.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sitebook_core::{AggregateId, AggregateRoot};
    use sitebook_events::execute;
    use sitebook_ledger::{
        AccrueCycleWages, PayrollCommand, PayrollLedger, PayrollLedgerId, RecordAdvance, RunMonthlySalaries,
        SalaryRosterEntry, SettlePayment, WageAccrual,
    };
    use sitebook_workforce::PaymentType;

    #[test]
    fn balances_match_the_ledger_aggregate() {
        let projection = PayrollProjection::new(Arc::new(InMemoryTenantStore::new()));
        let tenant = TenantId::new();
        let ledger_id = PayrollLedgerId::for_tenant(tenant);
        let mut ledger = PayrollLedger::empty(ledger_id);
        let user = UserId::new();
        let daily = WorkerId::new(AggregateId::new());
        let monthly = WorkerId::new(AggregateId::new());

        let commands = vec![
            PayrollCommand::AccrueCycleWages(AccrueCycleWages {
                tenant_id: tenant,
                ledger_id,
                accruals: vec![
                    WageAccrual { worker_id: daily, worker_name: "Ramesh".into(), amount: Money::new(6_000) },
                    WageAccrual { worker_id: monthly, worker_name: "Lata".into(), amount: Money::new(30_000) },
                ],
                accrued_by: user,
                occurred_at: Utc::now(),
            }),
            PayrollCommand::RecordAdvance(RecordAdvance {
                tenant_id: tenant,
                ledger_id,
                transaction_id: TransactionId::new(AggregateId::new()),
                worker_id: daily,
                worker_name: "Ramesh".into(),
                project_id: None,
                amount: Money::new(2_000),
                description: None,
                recorded_by: user,
                occurred_at: Utc::now(),
            }),
            PayrollCommand::SettlePayment(SettlePayment {
                tenant_id: tenant,
                ledger_id,
                transaction_id: TransactionId::new(AggregateId::new()),
                worker_id: daily,
                worker_name: "Ramesh".into(),
                amount: Money::new(1_500),
                description: None,
                settled_by: user,
                occurred_at: Utc::now(),
            }),
            PayrollCommand::RunMonthlySalaries(RunMonthlySalaries {
                tenant_id: tenant,
                ledger_id,
                payout_id: Uuid::now_v7(),
                roster: vec![
                    SalaryRosterEntry { worker_id: daily, worker_name: "Ramesh".into(), payment_type: PaymentType::Daily },
                    SalaryRosterEntry { worker_id: monthly, worker_name: "Lata".into(), payment_type: PaymentType::Monthly },
                ],
                paid_by: user,
                occurred_at: Utc::now(),
            }),
        ];

        for cmd in &commands {
            let start = ledger.version();
            for (offset, event) in execute(&mut ledger, cmd).unwrap().into_iter().enumerate() {
                let envelope = EventEnvelope::new(
                    Uuid::now_v7(),
                    tenant,
                    ledger_id.0,
                    PAYROLL_AGGREGATE,
                    start + offset as u64 + 1,
                    serde_json::to_value(&event).unwrap(),
                );
                projection.apply_envelope(&envelope).unwrap();
            }
        }

        for worker in [daily, monthly] {
            assert_eq!(projection.balance(tenant, &worker), ledger.balance(worker));
            let history = projection.worker(tenant, &worker).unwrap();
            let sum: Money = history.entries.iter().map(|e| e.amount).sum();
            assert_eq!(sum, history.balance);
        }
        assert_eq!(projection.balance(tenant, &daily), Money::new(2_500));
        assert_eq!(projection.balance(tenant, &monthly), Money::ZERO);

        let payouts = projection.salary_payouts(tenant);
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].total_amount_paid, Money::new(30_000));
        assert_eq!(payouts[0].paid_workers[0].worker_name, "Lata");
        assert_eq!(projection.total_outstanding(tenant), Money::new(2_500));
    }
}
