//! Read-side filters and reporting views over stock records.
//!
//! Everything here is a pure function of record snapshots; repositories use
//! [`StockFilter::matches`] to select rows and [`StockQuery::finish`] to order
//! and truncate the selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{LocationId, ProductId, StockRecordId};

use crate::record::StockRecord;

/// Row selection predicate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StockFilter {
    All,
    Product(ProductId),
    Location(LocationId),
    /// `available <= threshold` (low stock; out of stock is threshold 0).
    AvailableAtMost(i64),
    /// `available >= minimum` (sufficient stock).
    AvailableAtLeast(i64),
}

impl StockFilter {
    pub fn matches(&self, record: &StockRecord) -> bool {
        match *self {
            StockFilter::All => true,
            StockFilter::Product(product_id) => record.product_id() == product_id,
            StockFilter::Location(location_id) => record.location_id() == location_id,
            StockFilter::AvailableAtMost(threshold) => record.available() <= threshold,
            StockFilter::AvailableAtLeast(minimum) => record.available() >= minimum,
        }
    }
}

/// Optional ordering; unsorted results come back in storage order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockSort {
    AvailableAscending,
    AvailableDescending,
    RecentlyUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockQuery {
    pub filter: StockFilter,
    pub sort: Option<StockSort>,
    pub limit: Option<usize>,
}

impl StockQuery {
    pub fn new(filter: StockFilter) -> Self {
        Self {
            filter,
            sort: None,
            limit: None,
        }
    }

    pub fn all() -> Self {
        Self::new(StockFilter::All)
    }

    pub fn by_product(product_id: ProductId) -> Self {
        Self::new(StockFilter::Product(product_id))
    }

    pub fn by_location(location_id: LocationId) -> Self {
        Self::new(StockFilter::Location(location_id))
    }

    pub fn low_stock(threshold: i64) -> Self {
        Self::new(StockFilter::AvailableAtMost(threshold))
    }

    pub fn out_of_stock() -> Self {
        Self::new(StockFilter::AvailableAtMost(0))
    }

    pub fn sufficient_stock(minimum: i64) -> Self {
        Self::new(StockFilter::AvailableAtLeast(minimum))
    }

    pub fn sorted_by(mut self, sort: StockSort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &StockRecord) -> bool {
        self.filter.matches(record)
    }

    /// Order and truncate an already filtered selection.
    ///
    /// Ties are broken by record id so sorted output is deterministic.
    pub fn finish(&self, mut rows: Vec<StockRecord>) -> Vec<StockRecord> {
        if let Some(sort) = self.sort {
            match sort {
                StockSort::AvailableAscending => rows.sort_by(|a, b| {
                    a.available()
                        .cmp(&b.available())
                        .then_with(|| a.id_typed().as_uuid().cmp(b.id_typed().as_uuid()))
                }),
                StockSort::AvailableDescending => rows.sort_by(|a, b| {
                    b.available()
                        .cmp(&a.available())
                        .then_with(|| a.id_typed().as_uuid().cmp(b.id_typed().as_uuid()))
                }),
                StockSort::RecentlyUpdated => rows.sort_by(|a, b| {
                    b.last_updated()
                        .cmp(&a.last_updated())
                        .then_with(|| a.id_typed().as_uuid().cmp(b.id_typed().as_uuid()))
                }),
            }
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

impl Default for StockQuery {
    fn default() -> Self {
        Self::all()
    }
}

/// Serializable view of a record, with the derived `available` quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReport {
    pub id: StockRecordId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub last_updated: DateTime<Utc>,
    pub version: u64,
}

impl From<&StockRecord> for StockReport {
    fn from(record: &StockRecord) -> Self {
        use stockledger_core::AggregateRoot;

        Self {
            id: record.id_typed(),
            product_id: record.product_id(),
            location_id: record.location_id(),
            on_hand: record.on_hand(),
            reserved: record.reserved(),
            available: record.available(),
            last_updated: record.last_updated(),
            version: record.version(),
        }
    }
}
