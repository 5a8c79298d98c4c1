use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitebook_core::{
    require_text, Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId,
};
use sitebook_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub AggregateId);

impl WorkerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How a worker's base rate is earned. Only `monthly` workers are part of
/// the monthly salary run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Hourly,
    Daily,
    Monthly,
}

impl PaymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::Hourly => "hourly",
            PaymentType::Daily => "daily",
            PaymentType::Monthly => "monthly",
        }
    }
}

/// Aggregate root: Worker (roster entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    id: WorkerId,
    tenant_id: Option<TenantId>,
    name: String,
    skill: String,
    phone: String,
    payment_type: PaymentType,
    base_rate: Money,
    version: u64,
    created: bool,
    removed: bool,
}

impl Worker {
    pub fn empty(id: WorkerId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            skill: String::new(),
            phone: String::new(),
            payment_type: PaymentType::Daily,
            base_rate: Money::ZERO,
            version: 0,
            created: false,
            removed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    pub fn base_rate(&self) -> Money {
        self.base_rate
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    fn ensure_active(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created || self.removed {
            return Err(DomainError::NotFound);
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Worker {
    type Id = WorkerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWorker {
    pub tenant_id: TenantId,
    pub worker_id: WorkerId,
    pub name: String,
    pub skill: String,
    pub phone: String,
    pub payment_type: PaymentType,
    pub base_rate: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWorkerProfile {
    pub tenant_id: TenantId,
    pub worker_id: WorkerId,
    pub name: String,
    pub skill: String,
    pub phone: String,
    pub payment_type: PaymentType,
    pub base_rate: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveWorker.
///
/// The caller supplies the balance currently owed to the worker, read from
/// the payroll ledger. A worker is only removed once that balance is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveWorker {
    pub tenant_id: TenantId,
    pub worker_id: WorkerId,
    pub outstanding_balance: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerCommand {
    Register(RegisterWorker),
    UpdateProfile(UpdateWorkerProfile),
    Remove(RemoveWorker),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRegistered {
    pub tenant_id: TenantId,
    pub worker_id: WorkerId,
    pub name: String,
    pub skill: String,
    pub phone: String,
    pub payment_type: PaymentType,
    pub base_rate: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProfileUpdated {
    pub tenant_id: TenantId,
    pub worker_id: WorkerId,
    pub name: String,
    pub skill: String,
    pub phone: String,
    pub payment_type: PaymentType,
    pub base_rate: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRemoved {
    pub tenant_id: TenantId,
    pub worker_id: WorkerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerEvent {
    Registered(WorkerRegistered),
    ProfileUpdated(WorkerProfileUpdated),
    Removed(WorkerRemoved),
}

impl Event for WorkerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkerEvent::Registered(_) => "workforce.worker.registered",
            WorkerEvent::ProfileUpdated(_) => "workforce.worker.profile_updated",
            WorkerEvent::Removed(_) => "workforce.worker.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WorkerEvent::Registered(e) => e.occurred_at,
            WorkerEvent::ProfileUpdated(e) => e.occurred_at,
            WorkerEvent::Removed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Worker {
    type Command = WorkerCommand;
    type Event = WorkerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WorkerEvent::Registered(e) => {
                self.id = e.worker_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.skill = e.skill.clone();
                self.phone = e.phone.clone();
                self.payment_type = e.payment_type;
                self.base_rate = e.base_rate;
                self.created = true;
            }
            WorkerEvent::ProfileUpdated(e) => {
                self.name = e.name.clone();
                self.skill = e.skill.clone();
                self.phone = e.phone.clone();
                self.payment_type = e.payment_type;
                self.base_rate = e.base_rate;
            }
            WorkerEvent::Removed(_) => self.removed = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WorkerCommand::Register(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("worker already exists"));
                }
                Ok(vec![WorkerEvent::Registered(WorkerRegistered {
                    tenant_id: cmd.tenant_id,
                    worker_id: cmd.worker_id,
                    name: require_text("name", &cmd.name)?,
                    skill: require_text("skill", &cmd.skill)?,
                    phone: require_text("phone", &cmd.phone)?,
                    payment_type: cmd.payment_type,
                    base_rate: Money::positive("base_rate", cmd.base_rate.minor_units())?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WorkerCommand::UpdateProfile(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                Ok(vec![WorkerEvent::ProfileUpdated(WorkerProfileUpdated {
                    tenant_id: cmd.tenant_id,
                    worker_id: cmd.worker_id,
                    name: require_text("name", &cmd.name)?,
                    skill: require_text("skill", &cmd.skill)?,
                    phone: require_text("phone", &cmd.phone)?,
                    payment_type: cmd.payment_type,
                    base_rate: Money::positive("base_rate", cmd.base_rate.minor_units())?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WorkerCommand::Remove(cmd) => {
                self.ensure_active(cmd.tenant_id)?;
                if !cmd.outstanding_balance.is_zero() {
                    return Err(DomainError::invariant(format!(
                        "worker has an outstanding balance of {}; settle it before removing",
                        cmd.outstanding_balance
                    )));
                }
                Ok(vec![WorkerEvent::Removed(WorkerRemoved {
                    tenant_id: cmd.tenant_id,
                    worker_id: cmd.worker_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitebook_events::execute;

    fn registered(tenant_id: TenantId) -> Worker {
        let worker_id = WorkerId::new(AggregateId::new());
        let mut worker = Worker::empty(worker_id);
        execute(
            &mut worker,
            &WorkerCommand::Register(RegisterWorker {
                tenant_id,
                worker_id,
                name: "Ravi".to_string(),
                skill: "Mason".to_string(),
                phone: "9800000000".to_string(),
                payment_type: PaymentType::Daily,
                base_rate: Money::new(80_000),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        worker
    }

    fn remove(worker: &Worker, tenant_id: TenantId, balance: i64) -> WorkerCommand {
        WorkerCommand::Remove(RemoveWorker {
            tenant_id,
            worker_id: *worker.id(),
            outstanding_balance: Money::new(balance),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn register_requires_positive_rate() {
        let worker_id = WorkerId::new(AggregateId::new());
        let err = Worker::empty(worker_id)
            .handle(&WorkerCommand::Register(RegisterWorker {
                tenant_id: TenantId::new(),
                worker_id,
                name: "Ravi".to_string(),
                skill: "Mason".to_string(),
                phone: "98".to_string(),
                payment_type: PaymentType::Monthly,
                base_rate: Money::ZERO,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("base_rate must be positive"));
    }

    #[test]
    fn cannot_remove_worker_who_is_owed_money() {
        let tenant_id = TenantId::new();
        let worker = registered(tenant_id);
        let err = worker.handle(&remove(&worker, tenant_id, 1_500)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("15.00")));
    }

    #[test]
    fn cannot_remove_worker_with_negative_balance_either() {
        let tenant_id = TenantId::new();
        let worker = registered(tenant_id);
        assert!(worker.handle(&remove(&worker, tenant_id, -500)).is_err());
    }

    #[test]
    fn removed_worker_is_gone() {
        let tenant_id = TenantId::new();
        let mut worker = registered(tenant_id);
        let cmd = remove(&worker, tenant_id, 0);
        execute(&mut worker, &cmd).unwrap();
        assert!(worker.is_removed());
        assert_eq!(
            worker.handle(&remove(&worker, tenant_id, 0)).unwrap_err(),
            DomainError::NotFound
        );
    }

    #[test]
    fn payment_type_wire_names() {
        assert_eq!(serde_json::to_string(&PaymentType::Monthly).unwrap(), "\"monthly\"");
    }
}
