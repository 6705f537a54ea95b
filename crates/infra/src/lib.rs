//! Infrastructure layer: the stock ledger service, its row store and configuration.

pub mod config;
pub mod ledger;
pub mod repository;

mod integration_tests;

pub use config::LedgerConfig;
pub use ledger::{LedgerError, StockEnvelope, StockLedger, StockPatch};
pub use repository::{InMemoryStockRepository, RepositoryError, StockRepository};
