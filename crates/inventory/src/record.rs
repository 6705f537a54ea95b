use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, DomainError, ExpectedVersion, LocationId, ProductId, StockKey,
    StockRecordId,
};
use stockledger_events::Event;

/// Stream type under which stock events are published.
pub const STREAM_TYPE: &str = "inventory.stock";

/// Units committable right now.
///
/// Always derived from the stored pair; never stored itself.
pub const fn available_quantity(on_hand: i64, reserved: i64) -> i64 {
    on_hand - reserved
}

/// Validate a candidate (on_hand, reserved) pair against the record invariants.
pub fn validate_levels(on_hand: i64, reserved: i64) -> Result<(), DomainError> {
    if on_hand < 0 {
        return Err(DomainError::validation("on-hand quantity cannot be negative"));
    }
    if reserved < 0 {
        return Err(DomainError::validation("reserved quantity cannot be negative"));
    }
    if reserved > on_hand {
        return Err(DomainError::validation(format!(
            "reserved quantity ({reserved}) cannot exceed on-hand quantity ({on_hand})"
        )));
    }
    Ok(())
}

/// What deleting a record that still holds reservations does.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationDeletePolicy {
    /// Refuse the deletion while `reserved > 0`.
    #[default]
    Reject,
    /// Delete the record together with its reservations.
    Discard,
}

impl core::str::FromStr for ReservationDeletePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "discard" => Ok(Self::Discard),
            other => Err(DomainError::validation(format!(
                "unknown reservation delete policy '{other}' (expected reject or discard)"
            ))),
        }
    }
}

/// Aggregate root: the stock held for one (product, location) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRecord {
    id: StockRecordId,
    key: StockKey,
    on_hand: i64,
    reserved: i64,
    last_updated: DateTime<Utc>,
    version: u64,
    created: bool,
}

impl StockRecord {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: StockRecordId) -> Self {
        Self {
            id,
            key: StockKey::new(ProductId::new(0), LocationId::new(0)),
            on_hand: 0,
            reserved: 0,
            last_updated: DateTime::<Utc>::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockRecordId {
        self.id
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    pub fn location_id(&self) -> LocationId {
        self.key.location_id
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn available(&self) -> i64 {
        available_quantity(self.on_hand, self.reserved)
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_low_stock(&self, threshold: i64) -> bool {
        self.available() <= threshold
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.available() <= 0
    }

    /// Run `handle` and fold the resulting events into a copy of `self`.
    ///
    /// `self` is left untouched; on rejection nothing is produced.
    pub fn decide(&self, command: &StockCommand) -> Result<(StockRecord, Vec<StockEvent>), DomainError> {
        let events = self.handle(command)?;
        let mut next = self.clone();
        for event in &events {
            next.apply(event);
        }
        Ok((next, events))
    }
}

impl AggregateRoot for StockRecord {
    type Id = StockRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStock {
    pub record_id: StockRecordId,
    pub key: StockKey,
    pub on_hand: i64,
    pub reserved: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (signed delta on the on-hand quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub record_id: StockRecordId,
    pub delta: i64,
    /// Free-text audit note (e.g. "cycle count", "damaged").
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReservation {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FulfillReservation (release + ship in one step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillReservation {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: OverwriteStock (administrative correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteStock {
    pub record_id: StockRecordId,
    pub on_hand: Option<i64>,
    pub reserved: Option<i64>,
    pub expected_version: ExpectedVersion,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStock {
    pub record_id: StockRecordId,
    pub policy: ReservationDeletePolicy,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    CreateStock(CreateStock),
    AdjustStock(AdjustStock),
    ReserveStock(ReserveStock),
    ReleaseReservation(ReleaseReservation),
    FulfillReservation(FulfillReservation),
    OverwriteStock(OverwriteStock),
    DeleteStock(DeleteStock),
}

/// Event: StockCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCreated {
    pub record_id: StockRecordId,
    pub key: StockKey,
    pub on_hand: i64,
    pub reserved: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub record_id: StockRecordId,
    pub delta: i64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReleased {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationFulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFulfilled {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockOverwritten (carries the resulting levels).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOverwritten {
    pub record_id: StockRecordId,
    pub on_hand: i64,
    pub reserved: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDeleted {
    pub record_id: StockRecordId,
    pub key: StockKey,
    /// Reservations dropped together with the record (non-zero only under `Discard`).
    pub discarded_reserved: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    StockCreated(StockCreated),
    StockAdjusted(StockAdjusted),
    StockReserved(StockReserved),
    ReservationReleased(ReservationReleased),
    ReservationFulfilled(ReservationFulfilled),
    StockOverwritten(StockOverwritten),
    StockDeleted(StockDeleted),
}

impl StockEvent {
    pub fn record_id(&self) -> StockRecordId {
        match self {
            StockEvent::StockCreated(e) => e.record_id,
            StockEvent::StockAdjusted(e) => e.record_id,
            StockEvent::StockReserved(e) => e.record_id,
            StockEvent::ReservationReleased(e) => e.record_id,
            StockEvent::ReservationFulfilled(e) => e.record_id,
            StockEvent::StockOverwritten(e) => e.record_id,
            StockEvent::StockDeleted(e) => e.record_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockCreated(_) => "inventory.stock.created",
            StockEvent::StockAdjusted(_) => "inventory.stock.adjusted",
            StockEvent::StockReserved(_) => "inventory.stock.reserved",
            StockEvent::ReservationReleased(_) => "inventory.stock.released",
            StockEvent::ReservationFulfilled(_) => "inventory.stock.fulfilled",
            StockEvent::StockOverwritten(_) => "inventory.stock.overwritten",
            StockEvent::StockDeleted(_) => "inventory.stock.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockCreated(e) => e.occurred_at,
            StockEvent::StockAdjusted(e) => e.occurred_at,
            StockEvent::StockReserved(e) => e.occurred_at,
            StockEvent::ReservationReleased(e) => e.occurred_at,
            StockEvent::ReservationFulfilled(e) => e.occurred_at,
            StockEvent::StockOverwritten(e) => e.occurred_at,
            StockEvent::StockDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockRecord {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockCreated(e) => {
                self.id = e.record_id;
                self.key = e.key;
                self.on_hand = e.on_hand;
                self.reserved = e.reserved;
                self.created = true;
            }
            StockEvent::StockAdjusted(e) => {
                self.on_hand += e.delta;
            }
            StockEvent::StockReserved(e) => {
                self.reserved += e.quantity;
            }
            StockEvent::ReservationReleased(e) => {
                self.reserved -= e.quantity;
            }
            StockEvent::ReservationFulfilled(e) => {
                self.reserved -= e.quantity;
                self.on_hand -= e.quantity;
            }
            StockEvent::StockOverwritten(e) => {
                self.on_hand = e.on_hand;
                self.reserved = e.reserved;
            }
            StockEvent::StockDeleted(_) => {
                self.created = false;
            }
        }

        self.last_updated = Event::occurred_at(event);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::CreateStock(cmd) => self.handle_create(cmd),
            StockCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            StockCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            StockCommand::ReleaseReservation(cmd) => self.handle_release(cmd),
            StockCommand::FulfillReservation(cmd) => self.handle_fulfill(cmd),
            StockCommand::OverwriteStock(cmd) => self.handle_overwrite(cmd),
            StockCommand::DeleteStock(cmd) => self.handle_delete(cmd),
        }
    }
}

impl StockRecord {
    fn ensure_live(&self, record_id: StockRecordId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != record_id {
            return Err(DomainError::invalid_id("record_id mismatch"));
        }
        Ok(())
    }

    fn ensure_positive(quantity: i64, what: &str) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "{what} quantity must be positive (got {quantity})"
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateStock) -> Result<Vec<StockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock record already exists"));
        }
        validate_levels(cmd.on_hand, cmd.reserved)?;

        Ok(vec![StockEvent::StockCreated(StockCreated {
            record_id: cmd.record_id,
            key: cmd.key,
            on_hand: cmd.on_hand,
            reserved: cmd.reserved,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_live(cmd.record_id)?;

        if cmd.delta > 0 {
            self.on_hand
                .checked_add(cmd.delta)
                .ok_or_else(|| DomainError::validation("on-hand quantity would overflow"))?;
        } else if cmd.delta < 0 {
            // `i64::MIN` asks for 2^63 units, more than any record can hold.
            let Some(need) = cmd.delta.checked_neg() else {
                return Err(DomainError::insufficient_stock(i64::MAX, self.available()));
            };
            if self.available() < need {
                return Err(DomainError::insufficient_stock(need, self.available()));
            }
        }

        Ok(vec![StockEvent::StockAdjusted(StockAdjusted {
            record_id: cmd.record_id,
            delta: cmd.delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_live(cmd.record_id)?;
        Self::ensure_positive(cmd.quantity, "reserve")?;

        if self.available() < cmd.quantity {
            return Err(DomainError::insufficient_stock(cmd.quantity, self.available()));
        }

        Ok(vec![StockEvent::StockReserved(StockReserved {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseReservation) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_live(cmd.record_id)?;
        Self::ensure_positive(cmd.quantity, "release")?;

        if self.reserved < cmd.quantity {
            return Err(DomainError::insufficient_reservation(cmd.quantity, self.reserved));
        }

        Ok(vec![StockEvent::ReservationReleased(ReservationReleased {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fulfill(&self, cmd: &FulfillReservation) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_live(cmd.record_id)?;
        Self::ensure_positive(cmd.quantity, "fulfil")?;

        // reserved <= on_hand, so covering the reservation also covers the shipment.
        if self.reserved < cmd.quantity {
            return Err(DomainError::insufficient_reservation(cmd.quantity, self.reserved));
        }

        Ok(vec![StockEvent::ReservationFulfilled(ReservationFulfilled {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_overwrite(&self, cmd: &OverwriteStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_live(cmd.record_id)?;
        cmd.expected_version.check(self.version)?;

        let on_hand = cmd.on_hand.unwrap_or(self.on_hand);
        let reserved = cmd.reserved.unwrap_or(self.reserved);
        validate_levels(on_hand, reserved)?;

        Ok(vec![StockEvent::StockOverwritten(StockOverwritten {
            record_id: cmd.record_id,
            on_hand,
            reserved,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_live(cmd.record_id)?;

        if self.reserved > 0 && cmd.policy == ReservationDeletePolicy::Reject {
            return Err(DomainError::ReservationsOutstanding {
                reserved: self.reserved,
            });
        }

        Ok(vec![StockEvent::StockDeleted(StockDeleted {
            record_id: cmd.record_id,
            key: self.key,
            discarded_reserved: self.reserved,
            occurred_at: cmd.occurred_at,
        })])
    }
}
