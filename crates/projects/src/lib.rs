//! Projects domain module (event-sourced).
//!
//! Construction projects and the tasks tracked against them. Pure domain
//! logic: no IO, no HTTP, no storage.

pub mod project;
pub mod task;

pub use project::{
    AssignProjectManager, ChangeProjectStatus, CreateProject, Project, ProjectCommand, ProjectCreated,
    ProjectDetailsUpdated, ProjectEvent, ProjectId, ProjectManagerAssigned, ProjectStatus,
    ProjectStatusChanged, UpdateProjectDetails,
};
pub use task::{
    ChangeTaskStatus, CreateTask, DeleteTask, Task, TaskCommand, TaskCreated, TaskDeleted, TaskEvent,
    TaskId, TaskStatus, TaskStatusChanged, TaskUpdated, UpdateTask,
};
