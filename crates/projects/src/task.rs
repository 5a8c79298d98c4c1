use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sitebook_core::{require_text, Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use sitebook_events::Event;

use crate::ProjectId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub AggregateId);

impl TaskId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    #[serde(alias = "in_progress")]
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "inprogress",
            TaskStatus::Done => "done",
        }
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: Task (a unit of site work inside one project).
///
/// Deleting a task tombstones the stream; every later command is answered
/// with `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: TaskId,
    tenant_id: Option<TenantId>,
    project_id: Option<ProjectId>,
    title: String,
    description: Option<String>,
    expected_completion_date: Option<NaiveDate>,
    status: TaskStatus,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Task {
    pub fn empty(id: TaskId) -> Self {
        Self {
            id,
            tenant_id: None,
            project_id: None,
            title: String::new(),
            description: None,
            expected_completion_date: None,
            status: TaskStatus::Todo,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn ensure_live(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::NotFound);
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Task {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTask {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub expected_completion_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Full replacement of the editable fields, status included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTask {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub expected_completion_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTaskStatus {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTask {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskCommand {
    Create(CreateTask),
    Update(UpdateTask),
    ChangeStatus(ChangeTaskStatus),
    Delete(DeleteTask),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreated {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub expected_completion_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdated {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub expected_completion_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusChanged {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDeleted {
    pub tenant_id: TenantId,
    pub task_id: TaskId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEvent {
    Created(TaskCreated),
    Updated(TaskUpdated),
    StatusChanged(TaskStatusChanged),
    Deleted(TaskDeleted),
}

impl Event for TaskEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::Created(_) => "projects.task.created",
            TaskEvent::Updated(_) => "projects.task.updated",
            TaskEvent::StatusChanged(_) => "projects.task.status_changed",
            TaskEvent::Deleted(_) => "projects.task.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TaskEvent::Created(e) => e.occurred_at,
            TaskEvent::Updated(e) => e.occurred_at,
            TaskEvent::StatusChanged(e) => e.occurred_at,
            TaskEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Task {
    type Command = TaskCommand;
    type Event = TaskEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TaskEvent::Created(e) => {
                self.id = e.task_id;
                self.tenant_id = Some(e.tenant_id);
                self.project_id = Some(e.project_id);
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.expected_completion_date = e.expected_completion_date;
                self.status = e.status;
                self.created = true;
            }
            TaskEvent::Updated(e) => {
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.expected_completion_date = e.expected_completion_date;
                self.status = e.status;
            }
            TaskEvent::StatusChanged(e) => self.status = e.to,
            TaskEvent::Deleted(_) => self.deleted = true,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TaskCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("task already exists"));
                }
                Ok(vec![TaskEvent::Created(TaskCreated {
                    tenant_id: cmd.tenant_id,
                    task_id: cmd.task_id,
                    project_id: cmd.project_id,
                    title: require_text("title", &cmd.title)?,
                    description: optional_text(&cmd.description),
                    expected_completion_date: cmd.expected_completion_date,
                    status: TaskStatus::Todo,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TaskCommand::Update(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                Ok(vec![TaskEvent::Updated(TaskUpdated {
                    tenant_id: cmd.tenant_id,
                    task_id: cmd.task_id,
                    title: require_text("title", &cmd.title)?,
                    description: optional_text(&cmd.description),
                    expected_completion_date: cmd.expected_completion_date,
                    status: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TaskCommand::ChangeStatus(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                if self.status == cmd.status {
                    return Err(DomainError::invariant(format!("task is already {}", cmd.status)));
                }
                Ok(vec![TaskEvent::StatusChanged(TaskStatusChanged {
                    tenant_id: cmd.tenant_id,
                    task_id: cmd.task_id,
                    from: self.status,
                    to: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TaskCommand::Delete(cmd) => {
                self.ensure_live(cmd.tenant_id)?;
                Ok(vec![TaskEvent::Deleted(TaskDeleted {
                    tenant_id: cmd.tenant_id,
                    task_id: cmd.task_id,
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

    fn created(tenant_id: TenantId) -> Task {
        let task_id = TaskId::new(AggregateId::new());
        let mut task = Task::empty(task_id);
        execute(
            &mut task,
            &TaskCommand::Create(CreateTask {
                tenant_id,
                task_id,
                project_id: ProjectId::new(AggregateId::new()),
                title: " Pour slab, level 2 ".to_string(),
                description: Some("   ".to_string()),
                expected_completion_date: NaiveDate::from_ymd_opt(2026, 11, 30),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        task
    }

    fn status_cmd(task: &Task, tenant_id: TenantId, status: TaskStatus) -> TaskCommand {
        TaskCommand::ChangeStatus(ChangeTaskStatus {
            tenant_id,
            task_id: *task.id(),
            status,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn new_tasks_start_as_todo_with_trimmed_text() {
        let task = created(TenantId::new());
        assert_eq!(task.status(), TaskStatus::Todo);
        assert_eq!(task.title(), "Pour slab, level 2");
        assert_eq!(task.description, None);
    }

    #[test]
    fn status_change_to_same_status_is_rejected() {
        let tenant_id = TenantId::new();
        let mut task = created(tenant_id);
        assert!(task.handle(&status_cmd(&task, tenant_id, TaskStatus::Todo)).is_err());

        let cmd = status_cmd(&task, tenant_id, TaskStatus::InProgress);
        execute(&mut task, &cmd).unwrap();
        assert_eq!(task.status(), TaskStatus::InProgress);
    }

    #[test]
    fn deleted_task_rejects_further_commands() {
        let tenant_id = TenantId::new();
        let mut task = created(tenant_id);
        let task_id = *task.id();
        execute(
            &mut task,
            &TaskCommand::Delete(DeleteTask {
                tenant_id,
                task_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert!(task.is_deleted());
        let err = task.handle(&status_cmd(&task, tenant_id, TaskStatus::Done)).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn update_requires_title() {
        let tenant_id = TenantId::new();
        let task = created(tenant_id);
        let err = task
            .handle(&TaskCommand::Update(UpdateTask {
                tenant_id,
                task_id: *task.id(),
                title: String::new(),
                description: None,
                expected_completion_date: None,
                status: TaskStatus::Done,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("title cannot be empty"));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&TaskStatus::InProgress).unwrap(), "\"inprogress\"");
        let parsed: TaskStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(parsed, TaskStatus::InProgress);
    }
}
