//! Stock ledger service (application-level orchestration).
//!
//! Every mutation follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Acquire the record's serialization point (bounded by `lock_timeout`)
//!   ↓
//! 2. Build the command and decide events against the committed snapshot (pure)
//!   ↓
//! 3. Apply events to a copy and write it back (nothing is written on rejection)
//!   ↓
//! 4. Publish the committed events (best-effort, before the gate is released)
//! ```
//!
//! Publishing under the gate keeps one record's envelopes in commit order on
//! the bus.
//!
//! The ledger never clamps: any request that would leave
//! `0 <= reserved <= on_hand` is refused whole with a typed [`LedgerError`].

pub mod error;

use std::cell::Cell;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use stockledger_core::{
    AggregateRoot, EventId, ExpectedVersion, LocationId, ProductId, StockKey, StockRecordId,
};
use stockledger_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use stockledger_inventory::{
    AdjustStock, CreateStock, DeleteStock, FulfillReservation, OverwriteStock, ReleaseReservation,
    ReserveStock, STREAM_TYPE, StockCommand, StockEvent, StockQuery, StockRecord,
};

use crate::config::LedgerConfig;
use crate::repository::StockRepository;

pub use error::LedgerError;

/// Envelope type the ledger publishes.
pub type StockEnvelope = EventEnvelope<StockEvent>;

/// Administrative overwrite of a record's levels.
///
/// Unset fields keep their current value; the resulting pair must still
/// satisfy the record invariants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockPatch {
    pub on_hand: Option<i64>,
    pub reserved: Option<i64>,
    /// Guard against overwriting a record that changed since it was read.
    pub expected_version: ExpectedVersion,
}

impl StockPatch {
    pub fn on_hand(on_hand: i64) -> Self {
        Self {
            on_hand: Some(on_hand),
            ..Self::default()
        }
    }

    pub fn reserved(reserved: i64) -> Self {
        Self {
            reserved: Some(reserved),
            ..Self::default()
        }
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = ExpectedVersion::Exact(version);
        self
    }
}

/// The authority over legal stock transitions.
///
/// Share one instance across request threads (`Arc<StockLedger<..>>`); all
/// synchronization happens per record inside the repository.
#[derive(Debug)]
pub struct StockLedger<R, B = InMemoryEventBus<StockEnvelope>> {
    repository: R,
    bus: Option<B>,
    config: LedgerConfig,
}

impl<R> StockLedger<R>
where
    R: StockRepository,
{
    /// A ledger that publishes nothing.
    pub fn new(repository: R, config: LedgerConfig) -> Self {
        Self {
            repository,
            bus: None,
            config,
        }
    }
}

impl<R, B> StockLedger<R, B>
where
    R: StockRepository,
    B: EventBus<StockEnvelope>,
{
    pub fn with_bus(repository: R, bus: B, config: LedgerConfig) -> Self {
        Self {
            repository,
            bus: Some(bus),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Create the record for a (product, location) pair.
    #[instrument(skip(self), fields(product_id = %product_id, location_id = %location_id))]
    pub fn create(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        on_hand: i64,
        reserved: i64,
    ) -> Result<StockRecord, LedgerError> {
        let key = StockKey::new(product_id, location_id);
        let record_id = StockRecordId::new();
        let command = StockCommand::CreateStock(CreateStock {
            record_id,
            key,
            on_hand,
            reserved,
            occurred_at: Utc::now(),
        });

        let result = StockRecord::empty(record_id)
            .decide(&command)
            .map_err(LedgerError::from)
            .and_then(|(record, events)| {
                let emitted = Cell::new(events);
                let record = self
                    .repository
                    .insert(record, &mut |committed: &StockRecord| {
                        self.publish(committed, emitted.take())
                    })?;
                Ok(record)
            });

        match result {
            Ok(record) => {
                info!(record_id = %record_id, on_hand, reserved, "stock record created");
                Ok(record)
            }
            Err(err) => {
                warn!(error = %err, code = err.code(), "stock record creation rejected");
                Err(err)
            }
        }
    }

    /// Apply a signed delta to the on-hand quantity.
    pub fn adjust(&self, id: StockRecordId, delta: i64) -> Result<StockRecord, LedgerError> {
        self.adjust_with_reason(id, delta, None)
    }

    /// Apply a signed delta, recording why on the emitted event.
    #[instrument(skip(self, reason), fields(record_id = %id))]
    pub fn adjust_with_reason(
        &self,
        id: StockRecordId,
        delta: i64,
        reason: Option<String>,
    ) -> Result<StockRecord, LedgerError> {
        self.execute(id, "adjust", |record_id, occurred_at| {
            StockCommand::AdjustStock(AdjustStock {
                record_id,
                delta,
                reason: reason.clone(),
                occurred_at,
            })
        })
    }

    /// Commit `quantity` available units to a pending outbound operation.
    #[instrument(skip(self), fields(record_id = %id))]
    pub fn reserve(&self, id: StockRecordId, quantity: i64) -> Result<StockRecord, LedgerError> {
        self.execute(id, "reserve", |record_id, occurred_at| {
            StockCommand::ReserveStock(ReserveStock {
                record_id,
                quantity,
                occurred_at,
            })
        })
    }

    /// Cancel `quantity` reserved units, making them available again.
    #[instrument(skip(self), fields(record_id = %id))]
    pub fn release(&self, id: StockRecordId, quantity: i64) -> Result<StockRecord, LedgerError> {
        self.execute(id, "release", |record_id, occurred_at| {
            StockCommand::ReleaseReservation(ReleaseReservation {
                record_id,
                quantity,
                occurred_at,
            })
        })
    }

    /// Ship `quantity` reserved units: release and remove them in one step.
    #[instrument(skip(self), fields(record_id = %id))]
    pub fn fulfill(&self, id: StockRecordId, quantity: i64) -> Result<StockRecord, LedgerError> {
        self.execute(id, "fulfill", |record_id, occurred_at| {
            StockCommand::FulfillReservation(FulfillReservation {
                record_id,
                quantity,
                occurred_at,
            })
        })
    }

    /// Overwrite on-hand and/or reserved (administrative correction).
    #[instrument(skip(self), fields(record_id = %id))]
    pub fn update(&self, id: StockRecordId, patch: StockPatch) -> Result<StockRecord, LedgerError> {
        self.execute(id, "update", |record_id, occurred_at| {
            StockCommand::OverwriteStock(OverwriteStock {
                record_id,
                on_hand: patch.on_hand,
                reserved: patch.reserved,
                expected_version: patch.expected_version,
                occurred_at,
            })
        })
    }

    /// Remove a record. Returns whether it existed.
    ///
    /// With `ReservationDeletePolicy::Reject` a record holding reservations is
    /// kept and `ReservationsOutstanding` is returned.
    #[instrument(skip(self), fields(record_id = %id))]
    pub fn delete(&self, id: StockRecordId) -> Result<bool, LedgerError> {
        let deadline = Instant::now() + self.config.lock_timeout;
        let policy = self.config.reservation_delete_policy;
        let emitted = Cell::new(Vec::new());

        let result = self.repository.remove(
            id,
            deadline,
            &mut |current: &StockRecord| {
                let command = StockCommand::DeleteStock(DeleteStock {
                    record_id: id,
                    policy,
                    occurred_at: Utc::now(),
                });
                let (_, events) = current.decide(&command)?;
                emitted.set(events);
                Ok(())
            },
            &mut |removed: &StockRecord| self.publish_from(removed.version(), id, emitted.take()),
        );

        match result {
            Ok(Some(removed)) => {
                info!(
                    discarded_reserved = removed.reserved(),
                    "stock record deleted"
                );
                Ok(true)
            }
            Ok(None) => {
                warn!("delete of unknown stock record");
                Ok(false)
            }
            Err(err) => {
                let err = LedgerError::from(err);
                warn!(error = %err, code = err.code(), "stock record deletion rejected");
                Err(err)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn get(&self, id: StockRecordId) -> Result<StockRecord, LedgerError> {
        debug!(record_id = %id, "get stock record");
        self.repository.get(id)?.ok_or(LedgerError::NotFound)
    }

    pub fn find(
        &self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<StockRecord, LedgerError> {
        debug!(product_id = %product_id, location_id = %location_id, "find stock record");
        self.repository
            .find_by_key(StockKey::new(product_id, location_id))?
            .ok_or(LedgerError::NotFound)
    }

    pub fn list_all(&self) -> Result<Vec<StockRecord>, LedgerError> {
        self.query(&StockQuery::all())
    }

    pub fn list_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, LedgerError> {
        self.query(&StockQuery::by_product(product_id))
    }

    pub fn list_by_location(&self, location_id: LocationId) -> Result<Vec<StockRecord>, LedgerError> {
        self.query(&StockQuery::by_location(location_id))
    }

    /// Records with `available <= threshold`.
    pub fn low_stock(&self, threshold: i64) -> Result<Vec<StockRecord>, LedgerError> {
        self.query(&StockQuery::low_stock(threshold))
    }

    /// `low_stock` at the configured default threshold.
    pub fn low_stock_default(&self) -> Result<Vec<StockRecord>, LedgerError> {
        self.low_stock(self.config.default_low_stock_threshold)
    }

    /// Records with `available <= 0`.
    pub fn out_of_stock(&self) -> Result<Vec<StockRecord>, LedgerError> {
        self.query(&StockQuery::out_of_stock())
    }

    /// Records with `available >= minimum`.
    pub fn sufficient_stock(&self, minimum: i64) -> Result<Vec<StockRecord>, LedgerError> {
        self.query(&StockQuery::sufficient_stock(minimum))
    }

    pub fn query(&self, query: &StockQuery) -> Result<Vec<StockRecord>, LedgerError> {
        let rows = self.repository.query(query)?;
        debug!(filter = ?query.filter, sort = ?query.sort, count = rows.len(), "stock query");
        Ok(rows)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Run one command against one record under its serialization point.
    ///
    /// The command is built inside the critical section so `occurred_at`
    /// (and therefore `last_updated`) follows commit order.
    fn execute(
        &self,
        id: StockRecordId,
        operation: &'static str,
        make_command: impl Fn(StockRecordId, chrono::DateTime<Utc>) -> StockCommand,
    ) -> Result<StockRecord, LedgerError> {
        let deadline = Instant::now() + self.config.lock_timeout;
        let emitted = Cell::new(Vec::new());

        let result = self.repository.modify(
            id,
            deadline,
            &mut |current: &StockRecord| {
                let command = make_command(id, Utc::now());
                let (next, events) = current.decide(&command)?;
                emitted.set(events);
                Ok(next)
            },
            &mut |committed: &StockRecord| self.publish(committed, emitted.take()),
        );

        match result {
            Ok(record) => {
                info!(
                    operation,
                    on_hand = record.on_hand(),
                    reserved = record.reserved(),
                    available = record.available(),
                    version = record.version(),
                    "stock record updated"
                );
                Ok(record)
            }
            Err(err) => {
                let err = LedgerError::from(err);
                warn!(operation, error = %err, code = err.code(), "stock operation rejected");
                Err(err)
            }
        }
    }

    fn publish(&self, record: &StockRecord, events: Vec<StockEvent>) {
        let base = record.version().saturating_sub(events.len() as u64);
        self.publish_from(base, record.id_typed(), events);
    }

    /// Publish `events` as the versions following `base`.
    ///
    /// Runs under the record's gate after the write; a failed publication is
    /// logged only.
    fn publish_from(&self, base: u64, record_id: StockRecordId, events: Vec<StockEvent>) {
        let Some(bus) = &self.bus else {
            return;
        };

        for (offset, event) in events.into_iter().enumerate() {
            let event_type = event.event_type();
            let envelope = EventEnvelope::new(
                EventId::new(),
                record_id,
                STREAM_TYPE,
                base + offset as u64 + 1,
                event,
            );
            if let Err(err) = bus.publish(envelope) {
                warn!(record_id = %record_id, event_type, error = ?err, "failed to publish stock event");
            }
        }
    }
}
