//! Aggregate root traits shared by the ledger's domain model.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// An entity whose state changes only through its own events.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Count of events applied since the aggregate was created.
    ///
    /// A stock record starts at 0 and reaches 1 when its creation event is applied.
    fn version(&self) -> u64;
}

/// Version a writer believes the record is at when it issues a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Accept whatever version is current.
    #[default]
    Any,
    /// Refuse unless the record is exactly at this version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, current: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => expected == current,
        }
    }

    /// `Conflict` when the record moved on since the caller read it.
    pub fn check(self, current: u64) -> DomainResult<()> {
        if self.matches(current) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "record is at version {current}, caller expected {self:?}"
        )))
    }
}

/// Decide/apply split for aggregates.
///
/// `handle` inspects the current state and either refuses the command or
/// returns the events it implies; `apply` folds one event into the state.
/// Neither performs IO. Callers serialize rounds on the same aggregate.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Fold one event into the state; bumps `version` by one.
    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
