//! Infrastructure layer: event stores, command dispatch, read models and
//! projections, and the outbound model client used for budget insights.

pub mod ai;
pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
