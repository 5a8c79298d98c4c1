use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use sitebook_core::{AggregateId, TenantId};
use sitebook_events::EventEnvelope;

use super::ProjectionError;

/// Last applied sequence number per `(tenant, aggregate)` stream.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.inner.read() {
            Ok(cursors) => cursors.get(&(tenant_id, aggregate_id)).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// `Ok(false)` when the envelope was already applied.
    pub fn should_apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let last = self.get(envelope.tenant_id(), envelope.aggregate_id());
        let seq = envelope.sequence_number();

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if seq != last + 1 && last != 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert((envelope.tenant_id(), envelope.aggregate_id()), envelope.sequence_number());
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.retain(|(t, _), _| *t != tenant_id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn envelope(tenant: TenantId, agg: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), tenant, agg, "projects.task", seq, json!({}))
    }

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let tenant = TenantId::new();
        let agg = AggregateId::new();

        let first = envelope(tenant, agg, 1);
        assert!(cursors.should_apply(&first).unwrap());
        cursors.advance(&first);
        assert!(!cursors.should_apply(&first).unwrap());

        assert!(cursors.should_apply(&envelope(tenant, agg, 2)).unwrap());
        assert!(matches!(
            cursors.should_apply(&envelope(tenant, agg, 4)),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 4 })
        ));
        assert!(cursors.should_apply(&envelope(tenant, agg, 0)).is_err());
    }

    #[test]
    fn clearing_a_tenant_resets_its_streams_only() {
        let cursors = StreamCursors::new();
        let a = TenantId::new();
        let b = TenantId::new();
        let agg = AggregateId::new();

        cursors.advance(&envelope(a, agg, 3));
        cursors.advance(&envelope(b, agg, 5));
        cursors.clear_tenant(a);

        assert_eq!(cursors.get(a, agg), 0);
        assert_eq!(cursors.get(b, agg), 5);
    }
}
