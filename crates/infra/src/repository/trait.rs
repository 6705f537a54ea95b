use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use stockledger_core::{DomainError, DomainResult, StockKey, StockRecordId};
use stockledger_inventory::{StockQuery, StockRecord};

/// Repository operation error.
///
/// These are **infrastructure errors** (uniqueness, lock acquisition, storage)
/// plus `Rejected`, which carries a domain decision made under the row lock
/// back to the caller unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("a stock record already exists for {0}")]
    Duplicate(StockKey),

    #[error("stock record {0} not found")]
    NotFound(StockRecordId),

    #[error("stock record {record_id} is locked; gave up after {waited:?}")]
    Contention {
        record_id: StockRecordId,
        waited: Duration,
    },

    #[error("transition rejected: {0}")]
    Rejected(#[from] DomainError),

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Row store for stock records.
///
/// ## Contract
///
/// - Rows are keyed by `StockRecordId` with a unique secondary index on `StockKey`.
/// - `insert` checks the secondary index and inserts in one atomic step.
/// - `modify` and `remove` run under the row's write gate: the snapshot handed
///   to the callback is the latest committed one, and no other `modify` or
///   `remove` of the same row can interleave until the callback returns.
/// - Gate acquisition gives up at `deadline` with `Contention`.
/// - If a callback returns an error nothing is written.
/// - `committed` runs after the write is visible and before the row's gate is
///   released, so for one row the hooks run in commit order. It must not touch
///   the same row again.
/// - Reads (`get`, `find_by_key`, `query`) return committed snapshots and never
///   wait on a callback that is still deciding.
/// - Rows for different records never share a gate.
pub trait StockRepository: Send + Sync {
    /// Insert a freshly created record.
    fn insert(
        &self,
        record: StockRecord,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<StockRecord, RepositoryError>;

    fn get(&self, id: StockRecordId) -> Result<Option<StockRecord>, RepositoryError>;

    fn find_by_key(&self, key: StockKey) -> Result<Option<StockRecord>, RepositoryError>;

    /// Snapshots of every row matching `query.filter`, ordered/limited by `query`.
    fn query(&self, query: &StockQuery) -> Result<Vec<StockRecord>, RepositoryError>;

    /// Atomic read-modify-write of one row.
    fn modify(
        &self,
        id: StockRecordId,
        deadline: Instant,
        decide: &mut dyn FnMut(&StockRecord) -> DomainResult<StockRecord>,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<StockRecord, RepositoryError>;

    /// Remove one row if `check` allows it.
    ///
    /// Returns the last committed snapshot, or `None` if the row did not exist.
    /// `committed` receives that snapshot once the row is gone.
    fn remove(
        &self,
        id: StockRecordId,
        deadline: Instant,
        check: &mut dyn FnMut(&StockRecord) -> DomainResult<()>,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<Option<StockRecord>, RepositoryError>;
}

impl<S> StockRepository for Arc<S>
where
    S: StockRepository + ?Sized,
{
    fn insert(
        &self,
        record: StockRecord,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<StockRecord, RepositoryError> {
        (**self).insert(record, committed)
    }

    fn get(&self, id: StockRecordId) -> Result<Option<StockRecord>, RepositoryError> {
        (**self).get(id)
    }

    fn find_by_key(&self, key: StockKey) -> Result<Option<StockRecord>, RepositoryError> {
        (**self).find_by_key(key)
    }

    fn query(&self, query: &StockQuery) -> Result<Vec<StockRecord>, RepositoryError> {
        (**self).query(query)
    }

    fn modify(
        &self,
        id: StockRecordId,
        deadline: Instant,
        decide: &mut dyn FnMut(&StockRecord) -> DomainResult<StockRecord>,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<StockRecord, RepositoryError> {
        (**self).modify(id, deadline, decide, committed)
    }

    fn remove(
        &self,
        id: StockRecordId,
        deadline: Instant,
        check: &mut dyn FnMut(&StockRecord) -> DomainResult<()>,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<Option<StockRecord>, RepositoryError> {
        (**self).remove(id, deadline, check, committed)
    }
}
