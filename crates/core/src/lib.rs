//! Shared primitives for the stock ledger: identifiers, the domain error
//! model and the aggregate traits. Nothing here does IO.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{EventId, LocationId, ProductId, StockKey, StockRecordId};
