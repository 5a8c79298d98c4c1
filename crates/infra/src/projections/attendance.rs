use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use sitebook_core::{TenantId, UserId};
use sitebook_events::EventEnvelope;
use sitebook_projects::ProjectId;
use sitebook_workforce::{AttendanceEntry, AttendanceEvent, AttendanceSheetId, AttendanceStatus, WorkerId};

use super::{decode, ensure_tenant, ProjectionError, StreamCursors, ATTENDANCE_AGGREGATE};
use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSheetReadModel {
    pub sheet_id: AttendanceSheetId,
    pub project_id: ProjectId,
    pub date: NaiveDate,
    pub entries: Vec<AttendanceEntry>,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

/// One worker on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub sheet_id: AttendanceSheetId,
    pub date: NaiveDate,
    pub project_id: ProjectId,
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub status: AttendanceStatus,
    pub units_worked: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceDay {
    pub date: NaiveDate,
    pub present: usize,
    pub absent: usize,
    pub records: Vec<AttendanceRow>,
}

pub struct AttendanceProjection<S> {
    store: S,
    cursors: StreamCursors,
}

impl<S> AttendanceProjection<S>
where
    S: TenantStore<AttendanceSheetId, AttendanceSheetReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != ATTENDANCE_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let event: AttendanceEvent = decode(envelope)?;
        match event {
            AttendanceEvent::Recorded(e) => {
                ensure_tenant(envelope, e.tenant_id)?;
                self.store.upsert(
                    envelope.tenant_id(),
                    e.sheet_id,
                    AttendanceSheetReadModel {
                        sheet_id: e.sheet_id,
                        project_id: e.project_id,
                        date: e.date,
                        entries: e.entries,
                        recorded_by: e.recorded_by,
                        recorded_at: e.occurred_at,
                    },
                );
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    /// Sheets of a project grouped by day, most recent day first.
    pub fn for_project(&self, tenant_id: TenantId, project_id: ProjectId) -> Vec<AttendanceDay> {
        let mut sheets: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|s| s.project_id == project_id)
            .collect();
        sheets.sort_by(|a, b| b.date.cmp(&a.date));

        sheets
            .into_iter()
            .map(|sheet| {
                let records: Vec<_> = rows(&sheet).collect();
                AttendanceDay {
                    date: sheet.date,
                    present: records.iter().filter(|r| r.status == AttendanceStatus::Present).count(),
                    absent: records.iter().filter(|r| r.status == AttendanceStatus::Absent).count(),
                    records,
                }
            })
            .collect()
    }

    /// A worker's attendance across projects, most recent first.
    pub fn for_worker(&self, tenant_id: TenantId, worker_id: WorkerId) -> Vec<AttendanceRow> {
        let mut records: Vec<_> = self
            .store
            .list(tenant_id)
            .iter()
            .flat_map(rows)
            .filter(|r| r.worker_id == worker_id)
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        records
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}

fn rows(sheet: &AttendanceSheetReadModel) -> impl Iterator<Item = AttendanceRow> + '_ {
    sheet.entries.iter().map(move |entry| AttendanceRow {
        sheet_id: sheet.sheet_id,
        date: sheet.date,
        project_id: sheet.project_id,
        worker_id: entry.worker_id,
        worker_name: entry.worker_name.clone(),
        status: entry.status,
        units_worked: entry.units_worked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use sitebook_core::AggregateId;
    use sitebook_workforce::AttendanceRecorded;
    use uuid::Uuid;

    use crate::read_model::InMemoryTenantStore;

    fn record(tenant: TenantId, project_id: ProjectId, date: NaiveDate, entries: Vec<AttendanceEntry>) -> EventEnvelope<JsonValue> {
        let sheet_id = AttendanceSheetId::for_project_day(project_id, date);
        let e = AttendanceEvent::Recorded(AttendanceRecorded {
            tenant_id: tenant,
            sheet_id,
            project_id,
            date,
            entries,
            recorded_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        EventEnvelope::new(Uuid::now_v7(), tenant, sheet_id.0, ATTENDANCE_AGGREGATE, 1, serde_json::to_value(&e).unwrap())
    }

    #[test]
    fn groups_by_day_and_indexes_by_worker() {
        let projection = AttendanceProjection::new(Arc::new(InMemoryTenantStore::new()));
        let tenant = TenantId::new();
        let project_id = ProjectId::new(AggregateId::new());
        let worker = WorkerId::new(AggregateId::new());
        let other = WorkerId::new(AggregateId::new());
        let today = Utc::now().date_naive();
        let yesterday = today - Duration::days(1);

        let entry = |worker_id, status, units_worked| AttendanceEntry {
            worker_id,
            worker_name: "Anil".to_string(),
            status,
            units_worked,
        };

        projection
            .apply_envelope(&record(tenant, project_id, yesterday, vec![entry(worker, AttendanceStatus::Present, 8)]))
            .unwrap();
        projection
            .apply_envelope(&record(
                tenant,
                project_id,
                today,
                vec![entry(worker, AttendanceStatus::Absent, 0), entry(other, AttendanceStatus::Present, 6)],
            ))
            .unwrap();

        let days = projection.for_project(tenant, project_id);
        assert_eq!(days.iter().map(|d| d.date).collect::<Vec<_>>(), vec![today, yesterday]);
        assert_eq!((days[0].present, days[0].absent), (1, 1));

        let history = projection.for_worker(tenant, worker);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, AttendanceStatus::Absent);
        assert_eq!(history[1].units_worked, 8);
    }
}
