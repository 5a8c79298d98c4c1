use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitebook_core::{
    require_text, Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId,
};
use sitebook_events::Event;

/// Project identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub AggregateId);

impl ProjectId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    #[serde(alias = "in_progress")]
    Active,
    OnHold,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl core::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: Project.
///
/// Holds the budget figures an admin sets. Spent and received totals are
/// not kept here; they are derived from transaction events by the project
/// read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    id: ProjectId,
    tenant_id: Option<TenantId>,
    name: String,
    location: String,
    budget_limit: Money,
    order_value: Money,
    manager_id: Option<UserId>,
    status: ProjectStatus,
    version: u64,
    created: bool,
}

impl Project {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProjectId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            location: String::new(),
            budget_limit: Money::ZERO,
            order_value: Money::ZERO,
            manager_id: None,
            status: ProjectStatus::Planning,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn budget_limit(&self) -> Money {
        self.budget_limit
    }

    pub fn order_value(&self) -> Money {
        self.order_value
    }

    pub fn manager_id(&self) -> Option<UserId> {
        self.manager_id
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    fn ensure_created(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    pub location: String,
    pub budget_limit: Money,
    pub order_value: Money,
    pub manager_id: UserId,
    /// Defaults to `active` when not given.
    pub status: Option<ProjectStatus>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProjectDetails (full replacement of the editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProjectDetails {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    pub location: String,
    pub budget_limit: Money,
    pub order_value: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeProjectStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProjectStatus {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub status: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignProjectManager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignProjectManager {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub manager_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectCommand {
    Create(CreateProject),
    UpdateDetails(UpdateProjectDetails),
    ChangeStatus(ChangeProjectStatus),
    AssignManager(AssignProjectManager),
}

/// Event: ProjectCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    pub location: String,
    pub budget_limit: Money,
    pub order_value: Money,
    pub manager_id: UserId,
    pub status: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProjectDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetailsUpdated {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    pub location: String,
    pub budget_limit: Money,
    pub order_value: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProjectStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatusChanged {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub from: ProjectStatus,
    pub to: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProjectManagerAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManagerAssigned {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub previous_manager_id: Option<UserId>,
    pub manager_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectEvent {
    Created(ProjectCreated),
    DetailsUpdated(ProjectDetailsUpdated),
    StatusChanged(ProjectStatusChanged),
    ManagerAssigned(ProjectManagerAssigned),
}

impl Event for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::Created(_) => "projects.project.created",
            ProjectEvent::DetailsUpdated(_) => "projects.project.details_updated",
            ProjectEvent::StatusChanged(_) => "projects.project.status_changed",
            ProjectEvent::ManagerAssigned(_) => "projects.project.manager_assigned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProjectEvent::Created(e) => e.occurred_at,
            ProjectEvent::DetailsUpdated(e) => e.occurred_at,
            ProjectEvent::StatusChanged(e) => e.occurred_at,
            ProjectEvent::ManagerAssigned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Project {
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProjectEvent::Created(e) => {
                self.id = e.project_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.location = e.location.clone();
                self.budget_limit = e.budget_limit;
                self.order_value = e.order_value;
                self.manager_id = Some(e.manager_id);
                self.status = e.status;
                self.created = true;
            }
            ProjectEvent::DetailsUpdated(e) => {
                self.name = e.name.clone();
                self.location = e.location.clone();
                self.budget_limit = e.budget_limit;
                self.order_value = e.order_value;
            }
            ProjectEvent::StatusChanged(e) => self.status = e.to,
            ProjectEvent::ManagerAssigned(e) => self.manager_id = Some(e.manager_id),
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProjectCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("project already exists"));
                }

                Ok(vec![ProjectEvent::Created(ProjectCreated {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    name: require_text("name", &cmd.name)?,
                    location: require_text("location", &cmd.location)?,
                    budget_limit: Money::positive("budget_limit", cmd.budget_limit.minor_units())?,
                    order_value: Money::positive("order_value", cmd.order_value.minor_units())?,
                    manager_id: cmd.manager_id,
                    status: cmd.status.unwrap_or(ProjectStatus::Active),
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::UpdateDetails(cmd) => {
                self.ensure_created(cmd.tenant_id)?;

                Ok(vec![ProjectEvent::DetailsUpdated(ProjectDetailsUpdated {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    name: require_text("name", &cmd.name)?,
                    location: require_text("location", &cmd.location)?,
                    budget_limit: Money::positive("budget_limit", cmd.budget_limit.minor_units())?,
                    order_value: Money::positive("order_value", cmd.order_value.minor_units())?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::ChangeStatus(cmd) => {
                self.ensure_created(cmd.tenant_id)?;

                if self.status == ProjectStatus::Completed {
                    return Err(DomainError::invariant("completed projects cannot change status"));
                }
                if self.status == cmd.status {
                    return Err(DomainError::invariant(format!("project is already {}", cmd.status)));
                }

                Ok(vec![ProjectEvent::StatusChanged(ProjectStatusChanged {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    from: self.status,
                    to: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::AssignManager(cmd) => {
                self.ensure_created(cmd.tenant_id)?;

                if self.manager_id == Some(cmd.manager_id) {
                    return Err(DomainError::invariant("manager is already assigned to this project"));
                }

                Ok(vec![ProjectEvent::ManagerAssigned(ProjectManagerAssigned {
                    tenant_id: cmd.tenant_id,
                    project_id: cmd.project_id,
                    previous_manager_id: self.manager_id,
                    manager_id: cmd.manager_id,
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

    fn create_cmd(tenant_id: TenantId, project_id: ProjectId) -> CreateProject {
        CreateProject {
            tenant_id,
            project_id,
            name: "Riverside Villas".to_string(),
            location: "Pune".to_string(),
            budget_limit: Money::new(5_000_000),
            order_value: Money::new(6_500_000),
            manager_id: UserId::new(),
            status: None,
            occurred_at: Utc::now(),
        }
    }

    fn created(tenant_id: TenantId) -> Project {
        let project_id = ProjectId::new(AggregateId::new());
        let mut project = Project::empty(project_id);
        execute(&mut project, &ProjectCommand::Create(create_cmd(tenant_id, project_id))).unwrap();
        project
    }

    fn change_status(p: &Project, tenant_id: TenantId, status: ProjectStatus) -> ProjectCommand {
        ProjectCommand::ChangeStatus(ChangeProjectStatus {
            tenant_id,
            project_id: *p.id(),
            status,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn create_defaults_to_active() {
        let project = created(TenantId::new());
        assert_eq!(project.status(), ProjectStatus::Active);
        assert_eq!(project.budget_limit(), Money::new(5_000_000));
        assert_eq!(project.version(), 1);
    }

    #[test]
    fn create_rejects_non_positive_budget_and_blank_names() {
        let tenant_id = TenantId::new();
        let project_id = ProjectId::new(AggregateId::new());
        let project = Project::empty(project_id);

        let mut cmd = create_cmd(tenant_id, project_id);
        cmd.budget_limit = Money::ZERO;
        let err = project.handle(&ProjectCommand::Create(cmd)).unwrap_err();
        assert_eq!(err, DomainError::validation("budget_limit must be positive"));

        let mut cmd = create_cmd(tenant_id, project_id);
        cmd.location = "  ".to_string();
        let err = project.handle(&ProjectCommand::Create(cmd)).unwrap_err();
        assert_eq!(err, DomainError::validation("location cannot be empty"));
    }

    #[test]
    fn create_twice_conflicts() {
        let tenant_id = TenantId::new();
        let project = created(tenant_id);
        let err = project
            .handle(&ProjectCommand::Create(create_cmd(tenant_id, *project.id())))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn completed_projects_are_frozen() {
        let tenant_id = TenantId::new();
        let mut project = created(tenant_id);

        let same = change_status(&project, tenant_id, ProjectStatus::Active);
        assert!(matches!(project.handle(&same), Err(DomainError::InvariantViolation(_))));

        let cmd = change_status(&project, tenant_id, ProjectStatus::Completed);
        execute(&mut project, &cmd).unwrap();
        assert_eq!(project.status(), ProjectStatus::Completed);

        let reopen = change_status(&project, tenant_id, ProjectStatus::Active);
        let err = project.handle(&reopen).unwrap_err();
        assert_eq!(err, DomainError::invariant("completed projects cannot change status"));
    }

    #[test]
    fn reassigning_manager_records_previous() {
        let tenant_id = TenantId::new();
        let mut project = created(tenant_id);
        let before = project.manager_id();
        let next = UserId::new();

        let project_id = *project.id();
        let events = execute(
            &mut project,
            &ProjectCommand::AssignManager(AssignProjectManager {
                tenant_id,
                project_id,
                manager_id: next,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let ProjectEvent::ManagerAssigned(e) = &events[0] else {
            panic!("expected ManagerAssigned");
        };
        assert_eq!(e.previous_manager_id, before);
        assert_eq!(project.manager_id(), Some(next));
    }

    #[test]
    fn legacy_in_progress_status_deserializes_as_active() {
        let status: ProjectStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, ProjectStatus::Active);
        assert_eq!(serde_json::to_string(&ProjectStatus::OnHold).unwrap(), "\"on_hold\"");
    }

    #[test]
    fn commands_on_missing_project_are_not_found() {
        let project = Project::empty(ProjectId::new(AggregateId::new()));
        let cmd = change_status(&project, TenantId::new(), ProjectStatus::OnHold);
        assert_eq!(project.handle(&cmd).unwrap_err(), DomainError::NotFound);
    }
}
