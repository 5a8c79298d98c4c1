use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sitebook_core::{
    require_text, Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId,
};
use sitebook_events::Event;
use sitebook_projects::ProjectId;
use sitebook_workforce::{PaymentType, WorkerId};

use crate::TransactionId;

/// Identifier of a tenant's payroll ledger. There is exactly one per tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayrollLedgerId(pub AggregateId);

impl PayrollLedgerId {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::derived(tenant_id.as_uuid(), "ledger.payroll"))
    }
}

impl core::fmt::Display for PayrollLedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: PayrollLedger.
///
/// Owns the balance of every worker in the tenant. A balance is the sum of
/// the worker's unsettled entries: accrued wages minus advances, settlements
/// and salary payouts. Nothing else writes a balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollLedger {
    id: PayrollLedgerId,
    tenant_id: Option<TenantId>,
    balances: BTreeMap<WorkerId, Money>,
    version: u64,
}

impl PayrollLedger {
    pub fn empty(id: PayrollLedgerId) -> Self {
        Self {
            id,
            tenant_id: None,
            balances: BTreeMap::new(),
            version: 0,
        }
    }

    /// Balance owed to a worker; zero for workers with no entries.
    pub fn balance(&self, worker_id: WorkerId) -> Money {
        self.balances.get(&worker_id).copied().unwrap_or(Money::ZERO)
    }

    pub fn balances(&self) -> &BTreeMap<WorkerId, Money> {
        &self.balances
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        match self.tenant_id {
            Some(t) if t != tenant_id => Err(DomainError::invariant("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn ensure_ledger(&self, tenant_id: TenantId, ledger_id: PayrollLedgerId) -> Result<(), DomainError> {
        if ledger_id != PayrollLedgerId::for_tenant(tenant_id) {
            return Err(DomainError::invariant("payroll ledger does not belong to tenant"));
        }
        self.ensure_tenant(tenant_id)
    }

    fn credit(&mut self, worker_id: WorkerId, amount: Money) {
        let entry = self.balances.entry(worker_id).or_insert(Money::ZERO);
        *entry = entry.saturating_add(amount);
    }

    fn debit(&mut self, worker_id: WorkerId, amount: Money) {
        let entry = self.balances.entry(worker_id).or_insert(Money::ZERO);
        *entry = entry.saturating_sub(amount);
    }
}

impl AggregateRoot for PayrollLedger {
    type Id = PayrollLedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// Commands

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WageAccrual {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub amount: Money,
}

/// Start a pay cycle: each listed worker is credited with their base rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrueCycleWages {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub accruals: Vec<WageAccrual>,
    pub accrued_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAdvance {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub transaction_id: TransactionId,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub project_id: Option<ProjectId>,
    pub amount: Money,
    pub description: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePayment {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub transaction_id: TransactionId,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub amount: Money,
    pub description: Option<String>,
    pub settled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRosterEntry {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub payment_type: PaymentType,
}

/// Pay out the full balance of every monthly worker on the roster who is
/// owed money. Non-monthly workers are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMonthlySalaries {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub payout_id: Uuid,
    pub roster: Vec<SalaryRosterEntry>,
    pub paid_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayrollCommand {
    AccrueCycleWages(AccrueCycleWages),
    RecordAdvance(RecordAdvance),
    SettlePayment(SettlePayment),
    RunMonthlySalaries(RunMonthlySalaries),
}

// Events

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagesAccrued {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub accruals: Vec<WageAccrual>,
    pub accrued_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancePaid {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub transaction_id: TransactionId,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub project_id: Option<ProjectId>,
    pub amount: Money,
    pub description: String,
    pub balance_after: Money,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettled {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub transaction_id: TransactionId,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub amount: Money,
    pub description: String,
    pub balance_after: Money,
    pub settled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryLine {
    pub transaction_id: TransactionId,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalariesPaid {
    pub tenant_id: TenantId,
    pub ledger_id: PayrollLedgerId,
    pub payout_id: Uuid,
    /// e.g. "October 2026".
    pub period: String,
    pub lines: Vec<SalaryLine>,
    pub total: Money,
    pub paid_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayrollEvent {
    WagesAccrued(WagesAccrued),
    AdvancePaid(AdvancePaid),
    PaymentSettled(PaymentSettled),
    SalariesPaid(SalariesPaid),
}

impl Event for PayrollEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PayrollEvent::WagesAccrued(_) => "ledger.payroll.wages_accrued",
            PayrollEvent::AdvancePaid(_) => "ledger.payroll.advance_paid",
            PayrollEvent::PaymentSettled(_) => "ledger.payroll.payment_settled",
            PayrollEvent::SalariesPaid(_) => "ledger.payroll.salaries_paid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PayrollEvent::WagesAccrued(e) => e.occurred_at,
            PayrollEvent::AdvancePaid(e) => e.occurred_at,
            PayrollEvent::PaymentSettled(e) => e.occurred_at,
            PayrollEvent::SalariesPaid(e) => e.occurred_at,
        }
    }
}

/// Transaction id of one worker's line in a salary payout.
pub fn salary_transaction_id(payout_id: Uuid, worker_id: WorkerId) -> TransactionId {
    TransactionId::new(AggregateId::derived(&payout_id, &worker_id.to_string()))
}

fn description_or(value: &Option<String>, default: impl FnOnce() -> String) -> String {
    match value.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => default(),
    }
}

impl Aggregate for PayrollLedger {
    type Command = PayrollCommand;
    type Event = PayrollEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PayrollEvent::WagesAccrued(e) => {
                self.id = e.ledger_id;
                self.tenant_id.get_or_insert(e.tenant_id);
                for accrual in &e.accruals {
                    self.credit(accrual.worker_id, accrual.amount);
                }
            }
            PayrollEvent::AdvancePaid(e) => {
                self.id = e.ledger_id;
                self.tenant_id.get_or_insert(e.tenant_id);
                self.debit(e.worker_id, e.amount);
            }
            PayrollEvent::PaymentSettled(e) => {
                self.id = e.ledger_id;
                self.tenant_id.get_or_insert(e.tenant_id);
                self.debit(e.worker_id, e.amount);
            }
            PayrollEvent::SalariesPaid(e) => {
                self.id = e.ledger_id;
                self.tenant_id.get_or_insert(e.tenant_id);
                for line in &e.lines {
                    self.debit(line.worker_id, line.amount);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PayrollCommand::AccrueCycleWages(cmd) => self.handle_accrue(cmd),
            PayrollCommand::RecordAdvance(cmd) => self.handle_advance(cmd),
            PayrollCommand::SettlePayment(cmd) => self.handle_settle(cmd),
            PayrollCommand::RunMonthlySalaries(cmd) => self.handle_salaries(cmd),
        }
    }
}

impl PayrollLedger {
    fn handle_accrue(&self, cmd: &AccrueCycleWages) -> Result<Vec<PayrollEvent>, DomainError> {
        self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;

        if cmd.accruals.is_empty() {
            return Err(DomainError::validation("no workers to accrue wages for"));
        }

        let mut seen = HashSet::new();
        let mut accruals = Vec::with_capacity(cmd.accruals.len());
        for accrual in &cmd.accruals {
            if !seen.insert(accrual.worker_id) {
                return Err(DomainError::validation(format!(
                    "worker {} appears more than once",
                    accrual.worker_id
                )));
            }
            let amount = Money::positive("amount", accrual.amount.minor_units())?;
            self.balance(accrual.worker_id).checked_add(amount)?;
            accruals.push(WageAccrual {
                worker_id: accrual.worker_id,
                worker_name: require_text("worker_name", &accrual.worker_name)?,
                amount,
            });
        }

        Ok(vec![PayrollEvent::WagesAccrued(WagesAccrued {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            accruals,
            accrued_by: cmd.accrued_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance(&self, cmd: &RecordAdvance) -> Result<Vec<PayrollEvent>, DomainError> {
        self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;

        let amount = Money::positive("amount", cmd.amount.minor_units())?;
        let worker_name = require_text("worker_name", &cmd.worker_name)?;
        // May go below zero: an advance can exceed what has accrued so far.
        let balance_after = self.balance(cmd.worker_id).checked_sub(amount)?;

        Ok(vec![PayrollEvent::AdvancePaid(AdvancePaid {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            transaction_id: cmd.transaction_id,
            worker_id: cmd.worker_id,
            description: description_or(&cmd.description, || format!("Advance to {worker_name}")),
            worker_name,
            project_id: cmd.project_id,
            amount,
            balance_after,
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_settle(&self, cmd: &SettlePayment) -> Result<Vec<PayrollEvent>, DomainError> {
        self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;

        let amount = Money::positive("amount", cmd.amount.minor_units())?;
        let worker_name = require_text("worker_name", &cmd.worker_name)?;
        let balance = self.balance(cmd.worker_id);
        if amount > balance {
            return Err(DomainError::invariant(format!(
                "settlement of {amount} exceeds outstanding balance of {balance}"
            )));
        }

        Ok(vec![PayrollEvent::PaymentSettled(PaymentSettled {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            transaction_id: cmd.transaction_id,
            worker_id: cmd.worker_id,
            description: description_or(&cmd.description, || format!("Settlement to {worker_name}")),
            worker_name,
            amount,
            balance_after: balance.checked_sub(amount)?,
            settled_by: cmd.settled_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_salaries(&self, cmd: &RunMonthlySalaries) -> Result<Vec<PayrollEvent>, DomainError> {
        self.ensure_ledger(cmd.tenant_id, cmd.ledger_id)?;

        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        let mut total = Money::ZERO;
        for entry in &cmd.roster {
            if entry.payment_type != PaymentType::Monthly || !seen.insert(entry.worker_id) {
                continue;
            }
            let owed = self.balance(entry.worker_id);
            if !owed.is_positive() {
                continue;
            }
            total = total.checked_add(owed)?;
            lines.push(SalaryLine {
                transaction_id: salary_transaction_id(cmd.payout_id, entry.worker_id),
                worker_id: entry.worker_id,
                worker_name: entry.worker_name.trim().to_string(),
                amount: owed,
            });
        }

        if lines.is_empty() {
            return Err(DomainError::invariant("no salaries to pay"));
        }

        Ok(vec![PayrollEvent::SalariesPaid(SalariesPaid {
            tenant_id: cmd.tenant_id,
            ledger_id: cmd.ledger_id,
            payout_id: cmd.payout_id,
            period: cmd.occurred_at.format("%B %Y").to_string(),
            lines,
            total,
            paid_by: cmd.paid_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use sitebook_events::execute;

    fn worker() -> WorkerId {
        WorkerId::new(AggregateId::new())
    }

    fn ledger(tenant_id: TenantId) -> PayrollLedger {
        PayrollLedger::empty(PayrollLedgerId::for_tenant(tenant_id))
    }

    fn accrue(tenant_id: TenantId, lines: &[(WorkerId, i64)]) -> PayrollCommand {
        PayrollCommand::AccrueCycleWages(AccrueCycleWages {
            tenant_id,
            ledger_id: PayrollLedgerId::for_tenant(tenant_id),
            accruals: lines
                .iter()
                .map(|(worker_id, amount)| WageAccrual {
                    worker_id: *worker_id,
                    worker_name: "Mohan".to_string(),
                    amount: Money::new(*amount),
                })
                .collect(),
            accrued_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn advance(tenant_id: TenantId, worker_id: WorkerId, amount: i64) -> PayrollCommand {
        PayrollCommand::RecordAdvance(RecordAdvance {
            tenant_id,
            ledger_id: PayrollLedgerId::for_tenant(tenant_id),
            transaction_id: TransactionId::new(AggregateId::new()),
            worker_id,
            worker_name: "Mohan".to_string(),
            project_id: None,
            amount: Money::new(amount),
            description: None,
            recorded_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn settle(tenant_id: TenantId, worker_id: WorkerId, amount: i64) -> PayrollCommand {
        PayrollCommand::SettlePayment(SettlePayment {
            tenant_id,
            ledger_id: PayrollLedgerId::for_tenant(tenant_id),
            transaction_id: TransactionId::new(AggregateId::new()),
            worker_id,
            worker_name: "Mohan".to_string(),
            amount: Money::new(amount),
            description: Some("cash".to_string()),
            settled_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn salaries(tenant_id: TenantId, roster: &[(WorkerId, PaymentType)]) -> PayrollCommand {
        PayrollCommand::RunMonthlySalaries(RunMonthlySalaries {
            tenant_id,
            ledger_id: PayrollLedgerId::for_tenant(tenant_id),
            payout_id: Uuid::now_v7(),
            roster: roster
                .iter()
                .map(|(worker_id, payment_type)| SalaryRosterEntry {
                    worker_id: *worker_id,
                    worker_name: "Mohan".to_string(),
                    payment_type: *payment_type,
                })
                .collect(),
            paid_by: UserId::new(),
            occurred_at: Utc.with_ymd_and_hms(2026, 10, 31, 18, 0, 0).unwrap(),
        })
    }

    #[test]
    fn advance_may_take_balance_negative() {
        let tenant_id = TenantId::new();
        let w = worker();
        let mut l = ledger(tenant_id);
        execute(&mut l, &accrue(tenant_id, &[(w, 1_000)])).unwrap();

        let events = execute(&mut l, &advance(tenant_id, w, 1_500)).unwrap();
        let PayrollEvent::AdvancePaid(e) = &events[0] else {
            panic!("expected AdvancePaid");
        };
        assert_eq!(e.balance_after, Money::new(-500));
        assert_eq!(e.description, "Advance to Mohan");
        assert_eq!(l.balance(w), Money::new(-500));
    }

    #[test]
    fn settlement_cannot_exceed_balance() {
        let tenant_id = TenantId::new();
        let w = worker();
        let mut l = ledger(tenant_id);
        execute(&mut l, &accrue(tenant_id, &[(w, 1_000)])).unwrap();

        let err = l.handle(&settle(tenant_id, w, 1_001)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("exceeds")));

        execute(&mut l, &settle(tenant_id, w, 1_000)).unwrap();
        assert_eq!(l.balance(w), Money::ZERO);
    }

    #[test]
    fn accrual_rejects_empty_and_duplicate_rosters() {
        let tenant_id = TenantId::new();
        let l = ledger(tenant_id);
        assert!(matches!(l.handle(&accrue(tenant_id, &[])), Err(DomainError::Validation(_))));

        let w = worker();
        assert!(l.handle(&accrue(tenant_id, &[(w, 10), (w, 10)])).is_err());
    }

    #[test]
    fn salary_run_pays_monthly_workers_in_full() {
        let tenant_id = TenantId::new();
        let monthly = worker();
        let daily = worker();
        let broke = worker();
        let mut l = ledger(tenant_id);
        execute(&mut l, &accrue(tenant_id, &[(monthly, 30_000), (daily, 900), (broke, 100)])).unwrap();
        execute(&mut l, &advance(tenant_id, broke, 100)).unwrap();

        let events = execute(
            &mut l,
            &salaries(
                tenant_id,
                &[
                    (monthly, PaymentType::Monthly),
                    (daily, PaymentType::Daily),
                    (broke, PaymentType::Monthly),
                ],
            ),
        )
        .unwrap();

        let PayrollEvent::SalariesPaid(e) = &events[0] else {
            panic!("expected SalariesPaid");
        };
        assert_eq!(e.period, "October 2026");
        assert_eq!(e.lines.len(), 1);
        assert_eq!(e.lines[0].worker_id, monthly);
        assert_eq!(e.lines[0].transaction_id, salary_transaction_id(e.payout_id, monthly));
        assert_eq!(e.total, Money::new(30_000));
        assert_eq!(l.balance(monthly), Money::ZERO);
        assert_eq!(l.balance(daily), Money::new(900));
    }

    #[test]
    fn salary_run_with_nobody_owed_is_rejected() {
        let tenant_id = TenantId::new();
        let l = ledger(tenant_id);
        let err = l.handle(&salaries(tenant_id, &[(worker(), PaymentType::Monthly)])).unwrap_err();
        assert_eq!(err, DomainError::invariant("no salaries to pay"));
    }

    #[test]
    fn ledger_is_bound_to_its_tenant() {
        let tenant_id = TenantId::new();
        let mut l = ledger(tenant_id);
        execute(&mut l, &accrue(tenant_id, &[(worker(), 10)])).unwrap();

        let mut foreign = accrue(TenantId::new(), &[(worker(), 10)]);
        if let PayrollCommand::AccrueCycleWages(c) = &mut foreign {
            c.ledger_id = PayrollLedgerId::for_tenant(tenant_id);
        }
        assert!(matches!(l.handle(&foreign), Err(DomainError::InvariantViolation(_))));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Accrue(usize, i64),
        Advance(usize, i64),
        Settle(usize, i64),
        Salaries,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 1i64..50_000).prop_map(|(w, a)| Op::Accrue(w, a)),
            (0usize..3, 1i64..50_000).prop_map(|(w, a)| Op::Advance(w, a)),
            (0usize..3, 1i64..50_000).prop_map(|(w, a)| Op::Settle(w, a)),
            Just(Op::Salaries),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Every balance equals the signed sum of that worker's entries in
        /// the committed events, whatever mix of commands was accepted.
        #[test]
        fn balance_equals_sum_of_entries(ops in prop::collection::vec(op(), 1..40)) {
            let tenant_id = TenantId::new();
            let workers = [worker(), worker(), worker()];
            let roster: Vec<(WorkerId, PaymentType)> = vec![
                (workers[0], PaymentType::Monthly),
                (workers[1], PaymentType::Monthly),
                (workers[2], PaymentType::Daily),
            ];
            let mut l = ledger(tenant_id);
            let mut committed: Vec<PayrollEvent> = Vec::new();

            for op in ops {
                let cmd = match op {
                    Op::Accrue(w, a) => accrue(tenant_id, &[(workers[w], a)]),
                    Op::Advance(w, a) => advance(tenant_id, workers[w], a),
                    Op::Settle(w, a) => settle(tenant_id, workers[w], a),
                    Op::Salaries => salaries(tenant_id, &roster),
                };
                if let Ok(events) = execute(&mut l, &cmd) {
                    committed.extend(events);
                }
            }

            for w in workers {
                let mut sum: i64 = 0;
                for ev in &committed {
                    match ev {
                        PayrollEvent::WagesAccrued(e) => {
                            sum += e.accruals.iter().filter(|a| a.worker_id == w).map(|a| a.amount.minor_units()).sum::<i64>();
                        }
                        PayrollEvent::AdvancePaid(e) if e.worker_id == w => sum -= e.amount.minor_units(),
                        PayrollEvent::PaymentSettled(e) if e.worker_id == w => sum -= e.amount.minor_units(),
                        PayrollEvent::SalariesPaid(e) => {
                            sum -= e.lines.iter().filter(|l| l.worker_id == w).map(|l| l.amount.minor_units()).sum::<i64>();
                        }
                        _ => {}
                    }
                }
                prop_assert_eq!(l.balance(w).minor_units(), sum);
            }

            // Settlements never overdraw.
            for ev in &committed {
                if let PayrollEvent::PaymentSettled(e) = ev {
                    prop_assert!(e.balance_after.minor_units() >= 0);
                }
            }
        }
    }
}
