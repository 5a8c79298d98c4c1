use axum::{routing::get, Router};

pub mod common;
pub mod dashboard;
pub mod payroll;
pub mod projects;
pub mod system;
pub mod tasks;
pub mod transactions;
pub mod users;
pub mod workers;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .route("/dashboard", get(dashboard::dashboard))
        .nest("/users", users::router())
        .nest("/projects", projects::router())
        .nest("/tasks", tasks::router())
        .nest("/workers", workers::router())
        .nest("/payroll", payroll::router())
        .nest("/transactions", transactions::router())
}
