//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Why the stock model refused a transition.
///
/// Deterministic: the same command against the same record fails the same way.
/// Lock timeouts and storage faults are reported by the repository instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (negative quantity, `reserved > on_hand`, overflow).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A decrement or reservation asked for more than is available.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// A release or fulfilment asked for more than is reserved.
    #[error("insufficient reservation: requested {requested}, reserved {reserved}")]
    InsufficientReservation { requested: i64, reserved: i64 },

    /// The record still carries reservations and may not be removed.
    #[error("record still holds {reserved} reserved units")]
    ReservationsOutstanding { reserved: i64 },

    /// An identifier failed to parse or names a different record.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The command targets a record that was never created.
    #[error("not found")]
    NotFound,

    /// Create on an existing record, or an overwrite based on a stale version.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn insufficient_reservation(requested: i64, reserved: i64) -> Self {
        Self::InsufficientReservation {
            requested,
            reserved,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_quantities() {
        let err = DomainError::insufficient_stock(80, 70);
        assert_eq!(err.to_string(), "insufficient stock: requested 80, available 70");

        let err = DomainError::insufficient_reservation(5, 2);
        assert_eq!(err.to_string(), "insufficient reservation: requested 5, reserved 2");
    }
}
