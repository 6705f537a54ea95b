use std::time::Duration;

use thiserror::Error;

use stockledger_core::{DomainError, StockKey, StockRecordId};

use crate::repository::RepositoryError;

/// Why a ledger operation was refused.
///
/// Every variant except `Contention` describes a request that will fail again
/// unchanged; callers map these to transport statuses via [`LedgerError::code`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Unknown record id or (product, location) pair.
    #[error("stock record not found")]
    NotFound,

    /// A record for the (product, location) pair already exists.
    #[error("a stock record already exists for {0}")]
    DuplicateKey(StockKey),

    /// Negative or non-positive quantity, `reserved > on_hand`, overflow, bad id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Adjust-down or reserve exceeds the available quantity.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Release or fulfil exceeds the reserved quantity.
    #[error("insufficient reservation: requested {requested}, reserved {reserved}")]
    InsufficientReservation { requested: i64, reserved: i64 },

    /// Delete refused while the record still holds reservations.
    #[error("record still holds {reserved} reserved units")]
    ReservationsOutstanding { reserved: i64 },

    /// An administrative overwrite was based on a stale read.
    #[error("stale version: {0}")]
    StaleVersion(String),

    /// The record's serialization point could not be acquired in time.
    #[error("stock record {record_id} is busy; gave up after {waited:?}")]
    Contention {
        record_id: StockRecordId,
        waited: Duration,
    },

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    /// Stable machine-readable code for transport mapping.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound => "not_found",
            LedgerError::DuplicateKey(_) => "duplicate_key",
            LedgerError::InvalidArgument(_) => "invalid_argument",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::InsufficientReservation { .. } => "insufficient_reservation",
            LedgerError::ReservationsOutstanding { .. } => "reservations_outstanding",
            LedgerError::StaleVersion(_) => "stale_version",
            LedgerError::Contention { .. } => "contention",
            LedgerError::Store(_) => "store_error",
        }
    }

    /// Only contention may be retried without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Contention { .. })
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::InvalidArgument(msg),
            DomainError::InvalidId(msg) => LedgerError::InvalidArgument(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => LedgerError::InsufficientStock {
                requested,
                available,
            },
            DomainError::InsufficientReservation {
                requested,
                reserved,
            } => LedgerError::InsufficientReservation {
                requested,
                reserved,
            },
            DomainError::ReservationsOutstanding { reserved } => {
                LedgerError::ReservationsOutstanding { reserved }
            }
            DomainError::NotFound => LedgerError::NotFound,
            DomainError::Conflict(msg) => LedgerError::StaleVersion(msg),
        }
    }
}

impl From<RepositoryError> for LedgerError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Duplicate(key) => LedgerError::DuplicateKey(key),
            RepositoryError::NotFound(_) => LedgerError::NotFound,
            RepositoryError::Contention { record_id, waited } => {
                LedgerError::Contention { record_id, waited }
            }
            RepositoryError::Rejected(domain) => LedgerError::from(domain),
            RepositoryError::Backend(msg) => LedgerError::Store(msg),
        }
    }
}
