use std::collections::HashMap;
use std::sync::RwLock;

use sitebook_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{batch_stream, EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Global commit order, as `(stream, index into stream)`.
    log: Vec<(StreamKey, usize)>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some((tenant_id, aggregate_id, aggregate_type)) = batch_stream(&events)? else {
            return Ok(vec![]);
        };

        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            log.push((key, stream.len()));
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner
            .log
            .iter()
            .filter_map(|(key, idx)| inner.streams.get(key).and_then(|s| s.get(*idx)).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: format!("{aggregate_type}.touched"),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn assigns_sequence_numbers_and_checks_expected_version() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();

        let first = store
            .append(
                vec![event(tenant, agg, "projects.project"), event(tenant, agg, "projects.project")],
                ExpectedVersion::Exact(0),
            )
            .unwrap();
        assert_eq!(first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![1, 2]);

        let stale = store.append(vec![event(tenant, agg, "projects.project")], ExpectedVersion::Exact(0));
        assert!(matches!(stale, Err(EventStoreError::Concurrency(_))));

        assert_eq!(store.load_stream(tenant, agg).unwrap().len(), 2);
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let agg = AggregateId::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        store
            .append(vec![event(tenant_a, agg, "workforce.worker")], ExpectedVersion::Exact(0))
            .unwrap();

        assert!(store.load_stream(tenant_b, agg).unwrap().is_empty());

        let mixed = store.append(
            vec![event(tenant_a, agg, "workforce.worker"), event(tenant_b, agg, "workforce.worker")],
            ExpectedVersion::Any,
        );
        assert!(matches!(mixed, Err(EventStoreError::TenantIsolation(_))));
    }

    #[test]
    fn aggregate_type_is_stable_per_stream() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();

        store
            .append(vec![event(tenant, agg, "projects.task")], ExpectedVersion::Exact(0))
            .unwrap();
        let err = store
            .append(vec![event(tenant, agg, "projects.project")], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn load_all_returns_commit_order_across_streams() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        store.append(vec![event(tenant, a, "ledger.transaction")], ExpectedVersion::Exact(0)).unwrap();
        store.append(vec![event(tenant, b, "ledger.payroll")], ExpectedVersion::Exact(0)).unwrap();
        store.append(vec![event(tenant, a, "ledger.transaction")], ExpectedVersion::Exact(1)).unwrap();

        let all = store.load_all().unwrap();
        let order: Vec<_> = all.iter().map(|e| (e.aggregate_id, e.sequence_number)).collect();
        assert_eq!(order, vec![(a, 1), (b, 1), (a, 2)]);
    }
}
