//! Append-only event store boundary.
//!
//! Stores and loads tenant-scoped event streams without making storage
//! assumptions. The Postgres backend sits behind the `postgres` feature.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
