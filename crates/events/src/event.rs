use chrono::{DateTime, Utc};

/// A fact the ledger has committed.
///
/// Events are immutable and versioned. They are published only after the
/// corresponding write is durable.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "ledger.movement.committed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the underlying change happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
