//! Inventory stock domain module.
//!
//! This crate contains the business rules of the stock ledger, implemented
//! purely as deterministic domain logic (no IO, no locking, no storage).

pub mod query;
pub mod record;

pub use query::{StockFilter, StockQuery, StockReport, StockSort};
pub use record::{
    AdjustStock, CreateStock, DeleteStock, FulfillReservation, OverwriteStock, ReleaseReservation,
    ReservationDeletePolicy, ReservationFulfilled, ReservationReleased, ReserveStock, STREAM_TYPE,
    StockAdjusted, StockCommand, StockCreated, StockDeleted, StockEvent, StockOverwritten,
    StockRecord, StockReserved, available_quantity, validate_levels,
};
