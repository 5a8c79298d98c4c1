//! Infrastructure wiring: event store, bus, dispatcher, read models, AI.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{error, info, warn};

use sitebook_core::{Aggregate, AggregateId, DomainError, TenantId};
use sitebook_events::{EventBus, EventEnvelope, InMemoryEventBus};
use sitebook_infra::{
    ai::{BudgetInsightsService, LlmBudgetInsights, LlmConfig, LlmError, OpenAiCompatibleClient},
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent},
    projections::{ProjectionError, Projections},
};

use crate::config::ApiConfig;

/// Attempts for commands on the tenant-wide payroll stream.
const PAYROLL_RETRY_ATTEMPTS: usize = 3;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, Bus>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("read model rebuild failed: {0}")]
    Rebuild(#[from] ProjectionError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("USE_PERSISTENT_STORES=true but the server was built without the `postgres` feature")]
    PersistenceUnavailable,
}

/// Realtime message broadcast via SSE.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: JsonValue,
}

pub struct AppServices {
    dispatcher: Dispatcher,
    pub projections: Projections,
    pub insights: Arc<dyn BudgetInsightsService>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    /// Serializes commit-then-project so read models see each stream in order.
    write_gate: Mutex<()>,
}

impl AppServices {
    pub async fn build(config: &ApiConfig) -> Result<Self, StartupError> {
        let store = build_store(config).await?;
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

        let projections = Projections::in_memory();
        let history = store.load_all()?;
        if !history.is_empty() {
            projections.rebuild(&history)?;
        }

        let client = match &config.llm {
            Some(llm) => Some(OpenAiCompatibleClient::new(LlmConfig {
                api_url: llm.api_url.clone(),
                model: llm.model.clone(),
                api_key: llm.api_key.clone(),
                timeout: llm.timeout,
            })?),
            None => {
                info!("LLM_API_URL not set; budget insights use the heuristic summary");
                None
            }
        };

        spawn_realtime_forwarder(&bus, realtime_tx.clone());

        Ok(Self {
            dispatcher: CommandDispatcher::new(store, bus),
            projections,
            insights: Arc::new(LlmBudgetInsights::new(client)),
            realtime_tx,
            write_gate: Mutex::new(()),
        })
    }

    /// Dispatch a command and bring every read model up to date with what it
    /// committed before returning.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: sitebook_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatch_with::<A>(tenant_id, aggregate_id, aggregate_type, |_| command, make_aggregate)
    }

    /// Like [`dispatch`](Self::dispatch), but the command is built from the
    /// read models while the write gate is held. Use it when the command
    /// carries projected state (a balance, say) that must not change before
    /// the commit.
    pub fn dispatch_with<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        build: impl FnOnce(&Projections) -> A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: sitebook_events::Event + Serialize + DeserializeOwned,
    {
        off_runtime(|| -> Result<Vec<StoredEvent>, DispatchError> {
            let _gate = self.hold_gate();
            let command = build(&self.projections);
            let committed = self
                .dispatcher
                .dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)?;
            self.project(&committed);
            Ok(committed)
        })
    }

    /// Dispatch against a hot stream, retrying on concurrent appends.
    pub fn dispatch_with_retry<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Command: Clone,
        A::Event: sitebook_events::Event + Serialize + DeserializeOwned,
    {
        off_runtime(|| -> Result<Vec<StoredEvent>, DispatchError> {
            let _gate = self.hold_gate();
            let committed = self.dispatcher.dispatch_with_retry::<A>(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
                PAYROLL_RETRY_ATTEMPTS,
            )?;
            self.project(&committed);
            Ok(committed)
        })
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    fn hold_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn project(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(e) = self.projections.apply(&stored.to_envelope()) {
                error!(
                    aggregate_type = %stored.aggregate_type,
                    aggregate_id = %stored.aggregate_id,
                    sequence_number = stored.sequence_number,
                    error = %e,
                    "read model update failed"
                );
            }
        }
    }
}

/// Waiting on the write gate and the store blocks the calling thread. On a
/// multi-threaded runtime hand the worker's other tasks off first; a
/// current-thread runtime has nowhere to move them, so run in place.
fn off_runtime<R>(f: impl FnOnce() -> R) -> R {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

async fn build_store(config: &ApiConfig) -> Result<Arc<dyn EventStore>, StartupError> {
    if !config.use_persistent_stores {
        info!("using in-memory event store");
        return Ok(Arc::new(InMemoryEventStore::new()));
    }

    #[cfg(feature = "postgres")]
    {
        use sitebook_infra::event_store::PostgresEventStore;

        let url = config.database_url.as_deref().unwrap_or_default();
        let store = PostgresEventStore::connect(url).await?;
        info!("using Postgres event store");
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "postgres"))]
    {
        Err(StartupError::PersistenceUnavailable)
    }
}

/// Bus -> realtime broadcast. Lossy: slow SSE clients drop messages rather
/// than hold up command handling.
fn spawn_realtime_forwarder(bus: &Bus, realtime_tx: broadcast::Sender<RealtimeMessage>) {
    let subscription = bus.subscribe();
    let spawned = std::thread::Builder::new().name("realtime-forwarder".into()).spawn(move || {
        while let Ok(envelope) = subscription.recv() {
            let _ = realtime_tx.send(RealtimeMessage {
                tenant_id: envelope.tenant_id(),
                topic: format!("{}.changed", envelope.aggregate_type()),
                payload: serde_json::json!({
                    "event_id": envelope.event_id().to_string(),
                    "aggregate_type": envelope.aggregate_type(),
                    "aggregate_id": envelope.aggregate_id().to_string(),
                    "sequence_number": envelope.sequence_number(),
                    "event_type": event_type(envelope.payload()),
                }),
            });
        }
        warn!("event bus closed; realtime feed stopped");
    });
    if let Err(e) = spawned {
        error!(error = %e, "could not start realtime forwarder; SSE clients will see no events");
    }
}

/// Variant name of an externally tagged event payload, e.g. `"AdvancePaid"`.
fn event_type(payload: &JsonValue) -> Option<&str> {
    match payload.as_object() {
        Some(obj) if obj.len() == 1 => obj.keys().next().map(String::as_str),
        _ => None,
    }
}

pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use sitebook_core::Money;
    use sitebook_infra::projections::WORKER_AGGREGATE;
    use sitebook_workforce::{PaymentType, RegisterWorker, RemoveWorker, Worker, WorkerCommand, WorkerId};

    fn worker_registration(tenant_id: TenantId, worker_id: WorkerId) -> WorkerCommand {
        WorkerCommand::Register(RegisterWorker {
            tenant_id,
            worker_id,
            name: "Ramesh".to_string(),
            skill: "Mason".to_string(),
            phone: "9800000000".to_string(),
            payment_type: PaymentType::Daily,
            base_rate: Money::new(80_000),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn dispatch_with_builds_the_command_under_the_write_gate() {
        let services = AppServices::build(&ApiConfig::new("secret")).await.unwrap();
        let tenant_id = TenantId::new();
        let worker_id = WorkerId::new(AggregateId::new());
        services
            .dispatch::<Worker>(tenant_id, worker_id.0, WORKER_AGGREGATE, worker_registration(tenant_id, worker_id), |_, _| {
                Worker::empty(worker_id)
            })
            .unwrap();

        let committed = services
            .dispatch_with::<Worker>(
                tenant_id,
                worker_id.0,
                WORKER_AGGREGATE,
                |projections| {
                    assert!(services.write_gate.try_lock().is_err(), "gate must be held while building");
                    WorkerCommand::Remove(RemoveWorker {
                        tenant_id,
                        worker_id,
                        outstanding_balance: projections.payroll.balance(tenant_id, &worker_id),
                        occurred_at: Utc::now(),
                    })
                },
                |_, _| Worker::empty(worker_id),
            )
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert!(services.projections.worker(tenant_id, &worker_id).is_none());
        assert!(services.write_gate.try_lock().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dispatch_runs_on_a_multi_threaded_runtime() {
        let services = AppServices::build(&ApiConfig::new("secret")).await.unwrap();
        let tenant_id = TenantId::new();
        let worker_id = WorkerId::new(AggregateId::new());
        services
            .dispatch::<Worker>(tenant_id, worker_id.0, WORKER_AGGREGATE, worker_registration(tenant_id, worker_id), |_, _| {
                Worker::empty(worker_id)
            })
            .unwrap();
        assert!(services.projections.worker(tenant_id, &worker_id).is_some());
    }

    #[test]
    fn event_type_reads_the_variant_tag() {
        assert_eq!(event_type(&json!({ "AdvancePaid": { "amount": 1 } })), Some("AdvancePaid"));
        assert_eq!(event_type(&json!({ "a": 1, "b": 2 })), None);
        assert_eq!(event_type(&json!("Created")), None);
    }
}
