//! Stock record storage boundary.
//!
//! The ledger decides which transitions are legal; a repository decides how
//! rows are kept and provides the per-record serialization point the ledger
//! runs its decisions under.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryStockRepository;
pub use r#trait::{RepositoryError, StockRepository};
