use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sitebook_core::{require_text, Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use sitebook_events::Event;
use sitebook_projects::ProjectId;

use crate::WorkerId;

/// Widest UTC offset in use (UTC+14). A date is only "in the future" once it
/// has not started anywhere yet, so a site ahead of UTC can record its today.
const MAX_UTC_OFFSET_HOURS: i64 = 14;

/// Identifier of the attendance sheet for one project on one day.
///
/// Derived (UUIDv5) from the project id and the ISO date, so every writer
/// for the same project and day lands on the same stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceSheetId(pub AggregateId);

impl AttendanceSheetId {
    pub fn for_project_day(project_id: ProjectId, date: NaiveDate) -> Self {
        Self(AggregateId::derived(
            project_id.0.as_uuid(),
            &date.format("%Y-%m-%d").to_string(),
        ))
    }
}

impl core::fmt::Display for AttendanceSheetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

/// One worker's line on the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub worker_id: WorkerId,
    pub worker_name: String,
    pub status: AttendanceStatus,
    /// Hours, days or shifts depending on the worker's payment type.
    pub units_worked: u32,
}

/// Aggregate root: AttendanceSheet.
///
/// Written once. A second submission for the same project and date is a
/// duplicate record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSheet {
    id: AttendanceSheetId,
    tenant_id: Option<TenantId>,
    project_id: Option<ProjectId>,
    date: Option<NaiveDate>,
    entries: Vec<AttendanceEntry>,
    version: u64,
}

impl AttendanceSheet {
    pub fn empty(id: AttendanceSheetId) -> Self {
        Self {
            id,
            tenant_id: None,
            project_id: None,
            date: None,
            entries: Vec::new(),
            version: 0,
        }
    }

    pub fn is_recorded(&self) -> bool {
        self.date.is_some()
    }

    pub fn entries(&self) -> &[AttendanceEntry] {
        &self.entries
    }
}

impl AggregateRoot for AttendanceSheet {
    type Id = AttendanceSheetId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAttendance {
    pub tenant_id: TenantId,
    pub sheet_id: AttendanceSheetId,
    pub project_id: ProjectId,
    pub date: NaiveDate,
    pub entries: Vec<AttendanceEntry>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceCommand {
    Record(RecordAttendance),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecorded {
    pub tenant_id: TenantId,
    pub sheet_id: AttendanceSheetId,
    pub project_id: ProjectId,
    pub date: NaiveDate,
    pub entries: Vec<AttendanceEntry>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceEvent {
    Recorded(AttendanceRecorded),
}

impl Event for AttendanceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AttendanceEvent::Recorded(_) => "workforce.attendance.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AttendanceEvent::Recorded(e) => e.occurred_at,
        }
    }
}

fn validate_entries(entries: &[AttendanceEntry]) -> Result<Vec<AttendanceEntry>, DomainError> {
    if entries.is_empty() {
        return Err(DomainError::validation("attendance must list at least one worker"));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.worker_id) {
            return Err(DomainError::validation(format!(
                "worker {} appears more than once",
                entry.worker_id
            )));
        }
        match (entry.status, entry.units_worked) {
            (AttendanceStatus::Present, 0) => {
                return Err(DomainError::validation(format!(
                    "present worker {} must have units_worked > 0",
                    entry.worker_id
                )));
            }
            (AttendanceStatus::Absent, n) if n > 0 => {
                return Err(DomainError::validation(format!(
                    "absent worker {} cannot have units_worked",
                    entry.worker_id
                )));
            }
            _ => {}
        }
        out.push(AttendanceEntry {
            worker_name: require_text("worker_name", &entry.worker_name)?,
            ..entry.clone()
        });
    }
    Ok(out)
}

impl Aggregate for AttendanceSheet {
    type Command = AttendanceCommand;
    type Event = AttendanceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AttendanceEvent::Recorded(e) => {
                self.id = e.sheet_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.date = Some(e.date);
                self.entries = e.entries.clone();
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AttendanceCommand::Record(cmd) => {
                if cmd.sheet_id != AttendanceSheetId::for_project_day(cmd.project_id, cmd.date) {
                    return Err(DomainError::validation("sheet id does not match project and date"));
                }
                if self.is_recorded() {
                    return Err(DomainError::conflict(format!(
                        "duplicate record: attendance for {} is already recorded",
                        cmd.date
                    )));
                }
                if cmd.date > (cmd.occurred_at + Duration::hours(MAX_UTC_OFFSET_HOURS)).date_naive() {
                    return Err(DomainError::validation("attendance date cannot be in the future"));
                }

                Ok(vec![AttendanceEvent::Recorded(AttendanceRecorded {
                    tenant_id: cmd.tenant_id,
                    sheet_id: cmd.sheet_id,
                    project_id: cmd.project_id,
                    date: cmd.date,
                    entries: validate_entries(&cmd.entries)?,
                    recorded_by: cmd.recorded_by,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sitebook_events::execute;

    fn entry(status: AttendanceStatus, units: u32) -> AttendanceEntry {
        AttendanceEntry {
            worker_id: WorkerId::new(AggregateId::new()),
            worker_name: "Sunil".to_string(),
            status,
            units_worked: units,
        }
    }

    fn record(project_id: ProjectId, date: NaiveDate, entries: Vec<AttendanceEntry>) -> AttendanceCommand {
        record_at(project_id, date, entries, Utc::now())
    }

    fn record_at(
        project_id: ProjectId,
        date: NaiveDate,
        entries: Vec<AttendanceEntry>,
        occurred_at: DateTime<Utc>,
    ) -> AttendanceCommand {
        AttendanceCommand::Record(RecordAttendance {
            tenant_id: TenantId::new(),
            sheet_id: AttendanceSheetId::for_project_day(project_id, date),
            project_id,
            date,
            entries,
            recorded_by: UserId::new(),
            occurred_at,
        })
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn sheet_ids_are_per_project_and_day() {
        let project = ProjectId::new(AggregateId::new());
        let other = ProjectId::new(AggregateId::new());
        let day = today();
        assert_eq!(
            AttendanceSheetId::for_project_day(project, day),
            AttendanceSheetId::for_project_day(project, day)
        );
        assert_ne!(
            AttendanceSheetId::for_project_day(project, day),
            AttendanceSheetId::for_project_day(other, day)
        );
    }

    #[test]
    fn second_submission_for_same_day_is_duplicate() {
        let project = ProjectId::new(AggregateId::new());
        let cmd = record(project, today(), vec![entry(AttendanceStatus::Present, 8)]);
        let mut sheet = AttendanceSheet::empty(AttendanceSheetId::for_project_day(project, today()));

        execute(&mut sheet, &cmd).unwrap();
        let err = sheet.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(msg) if msg.contains("duplicate record")));
    }

    #[test]
    fn future_dates_are_rejected() {
        let project = ProjectId::new(AggregateId::new());
        let day_after_tomorrow = today() + Duration::days(2);
        let sheet = AttendanceSheet::empty(AttendanceSheetId::for_project_day(project, day_after_tomorrow));
        let err = sheet
            .handle(&record(project, day_after_tomorrow, vec![entry(AttendanceStatus::Present, 1)]))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("attendance date cannot be in the future"));
    }

    #[test]
    fn local_today_ahead_of_utc_is_accepted() {
        let project = ProjectId::new(AggregateId::new());
        let local_today = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        let sheet = AttendanceSheet::empty(AttendanceSheetId::for_project_day(project, local_today));

        // 01:00 on 11 March in India is still 10 March in UTC.
        let early_morning_ist = Utc.with_ymd_and_hms(2026, 3, 10, 19, 30, 0).unwrap();
        let cmd = record_at(project, local_today, vec![entry(AttendanceStatus::Present, 1)], early_morning_ist);
        assert!(sheet.handle(&cmd).is_ok());

        // 11 March has not started anywhere at 05:00 UTC on 10 March.
        let too_early = Utc.with_ymd_and_hms(2026, 3, 10, 5, 0, 0).unwrap();
        let cmd = record_at(project, local_today, vec![entry(AttendanceStatus::Present, 1)], too_early);
        assert_eq!(
            sheet.handle(&cmd).unwrap_err(),
            DomainError::validation("attendance date cannot be in the future")
        );
    }

    #[test]
    fn units_must_agree_with_status() {
        let project = ProjectId::new(AggregateId::new());
        let sheet = AttendanceSheet::empty(AttendanceSheetId::for_project_day(project, today()));

        for bad in [entry(AttendanceStatus::Present, 0), entry(AttendanceStatus::Absent, 3)] {
            let result = sheet.handle(&record(project, today(), vec![bad]));
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        let ok = sheet.handle(&record(
            project,
            today(),
            vec![entry(AttendanceStatus::Absent, 0), entry(AttendanceStatus::Present, 1)],
        ));
        assert!(ok.is_ok());
    }

    #[test]
    fn duplicate_workers_and_empty_sheets_are_rejected() {
        let project = ProjectId::new(AggregateId::new());
        let sheet = AttendanceSheet::empty(AttendanceSheetId::for_project_day(project, today()));

        assert!(sheet.handle(&record(project, today(), vec![])).is_err());

        let e = entry(AttendanceStatus::Present, 8);
        assert!(sheet.handle(&record(project, today(), vec![e.clone(), e])).is_err());
    }

    #[test]
    fn mismatched_sheet_id_is_rejected() {
        let project = ProjectId::new(AggregateId::new());
        let mut cmd = record(project, today(), vec![entry(AttendanceStatus::Present, 8)]);
        if let AttendanceCommand::Record(c) = &mut cmd {
            c.sheet_id = AttendanceSheetId(AggregateId::new());
        }
        let sheet = AttendanceSheet::empty(AttendanceSheetId(AggregateId::new()));
        assert!(matches!(sheet.handle(&cmd), Err(DomainError::Validation(_))));
    }
}
