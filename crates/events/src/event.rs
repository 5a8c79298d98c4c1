use chrono::{DateTime, Utc};

/// A fact recorded by an aggregate.
///
/// Events are immutable, carry a schema version, and are only ever appended.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"ledger.payroll.payment_settled"`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time of the fact (not the time it was stored).
    fn occurred_at(&self) -> DateTime<Utc>;
}
