use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are immutable facts describing a committed transition.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "inventory.stock.reserved").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the transition was committed (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
