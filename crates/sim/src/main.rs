//! Drives a shared ledger from many threads and prints a stock report.
//!
//! ```text
//! RUST_LOG=warn STOCKLEDGER_SIM_WORKERS=16 cargo run -p stockledger-sim
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, ensure};
use serde::Serialize;

use stockledger_core::{LocationId, ProductId, StockRecordId};
use stockledger_events::{Event, EventBus, InMemoryEventBus};
use stockledger_infra::{InMemoryStockRepository, LedgerConfig, LedgerError, StockEnvelope, StockLedger};
use stockledger_inventory::StockReport;

type SimLedger = StockLedger<Arc<InMemoryStockRepository>, Arc<InMemoryEventBus<StockEnvelope>>>;

const PRODUCTS: i64 = 5;
const LOCATIONS: i64 = 2;
const INITIAL_ON_HAND: i64 = 100;

#[derive(Debug, Serialize)]
struct SimReport {
    workers: usize,
    orders_per_worker: usize,
    outcomes: BTreeMap<&'static str, usize>,
    events: BTreeMap<&'static str, usize>,
    /// Units still reserved by orders that could neither settle nor be released.
    leaked_reserved: i64,
    low_stock_threshold: i64,
    low_stock: Vec<StockReport>,
    out_of_stock: Vec<StockReport>,
}

fn env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable setting; using default");
            default
        }),
        Err(_) => default,
    }
}

/// Retry an operation a few times while it fails with contention.
fn with_retry<T>(mut op: impl FnMut() -> Result<T, LedgerError>) -> Result<T, LedgerError> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < 3 => {
                attempt += 1;
                tracing::warn!(attempt, error = %err, "retrying after contention");
            }
            other => return other,
        }
    }
}

/// How a simulated order ended, plus any units it left reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderOutcome {
    label: &'static str,
    leaked: i64,
}

impl OrderOutcome {
    fn clean(label: &'static str) -> Self {
        Self { label, leaked: 0 }
    }
}

/// One simulated order: reserve, then either ship or cancel.
///
/// If settling fails after its retries, the reservation is handed back with a
/// release; only when that fails too are the units reported as leaked.
fn place_order(ledger: &SimLedger, id: StockRecordId, quantity: i64, ship: bool) -> OrderOutcome {
    if let Err(err) = with_retry(|| ledger.reserve(id, quantity)) {
        return OrderOutcome::clean(err.code());
    }
    settle(ledger, id, quantity, ship)
}

fn settle(ledger: &SimLedger, id: StockRecordId, quantity: i64, ship: bool) -> OrderOutcome {
    let settled = with_retry(|| {
        if ship {
            ledger.fulfill(id, quantity)
        } else {
            ledger.release(id, quantity)
        }
    });
    let err = match settled {
        Ok(_) if ship => return OrderOutcome::clean("fulfilled"),
        Ok(_) => return OrderOutcome::clean("released"),
        Err(err) => err,
    };

    if ship && with_retry(|| ledger.release(id, quantity)).is_ok() {
        tracing::warn!(record_id = %id, quantity, error = %err, "fulfill failed; reservation released");
        return OrderOutcome::clean(err.code());
    }
    // A deleted record took its reservations with it.
    let leaked = if ledger.get(id).is_ok() { quantity } else { 0 };
    tracing::error!(record_id = %id, leaked, error = %err, "order could not settle its reservation");
    OrderOutcome {
        label: err.code(),
        leaked,
    }
}

fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let config = LedgerConfig::from_env();
    let workers = env_usize("STOCKLEDGER_SIM_WORKERS", 8);
    let orders_per_worker = env_usize("STOCKLEDGER_SIM_ORDERS", 50);
    let low_stock_threshold = config.default_low_stock_threshold;

    let repository = Arc::new(InMemoryStockRepository::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let ledger = Arc::new(StockLedger::with_bus(repository, bus.clone(), config));

    // Count published events on a separate consumer, the way a projection would.
    let subscription = bus.subscribe();
    let listener = thread::spawn(move || {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut last_seen: HashMap<StockRecordId, u64> = HashMap::new();
        while let Ok(envelope) = subscription.recv() {
            *counts.entry(envelope.payload().event_type()).or_default() += 1;
            last_seen
                .entry(envelope.record_id())
                .and_modify(|seq| *seq = (*seq).max(envelope.sequence_number()))
                .or_insert(envelope.sequence_number());
        }
        tracing::info!(streams = last_seen.len(), "event listener drained");
        counts
    });

    let mut ids = Vec::new();
    for product in 1..=PRODUCTS {
        for location in 1..=LOCATIONS {
            let record = ledger
                .create(
                    ProductId::new(product),
                    LocationId::new(location),
                    INITIAL_ON_HAND,
                    0,
                )
                .with_context(|| format!("seeding product {product} at location {location}"))?;
            ids.push(record.id_typed());
        }
    }
    let ids = Arc::new(ids);

    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let ledger = ledger.clone();
            let ids = ids.clone();
            thread::spawn(move || {
                let mut outcomes: BTreeMap<&'static str, usize> = BTreeMap::new();
                let mut leaked = 0;
                for order in 0..orders_per_worker {
                    let id = ids[(worker * 31 + order * 7) % ids.len()];
                    let quantity = ((worker + order) % 5 + 1) as i64;
                    let outcome = place_order(&ledger, id, quantity, order % 3 != 0);
                    *outcomes.entry(outcome.label).or_default() += 1;
                    leaked += outcome.leaked;
                }
                (outcomes, leaked)
            })
        })
        .collect();

    let mut outcomes: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut leaked_reserved = 0;
    for handle in handles {
        let (worker_outcomes, worker_leaked) = handle
            .join()
            .map_err(|_| anyhow::anyhow!("simulation worker panicked"))?;
        for (outcome, count) in worker_outcomes {
            *outcomes.entry(outcome).or_default() += count;
        }
        leaked_reserved += worker_leaked;
    }

    for record in ledger.list_all()? {
        ensure!(
            record.reserved() >= 0 && record.reserved() <= record.on_hand(),
            "ledger invariant violated for {}",
            record.id_typed()
        );
    }

    // Whatever is still reserved must be accounted for by orders that leaked.
    let leftover: i64 = ledger.list_all()?.iter().map(|r| r.reserved()).sum();
    ensure!(
        leftover == leaked_reserved,
        "{leftover} units left reserved but orders reported {leaked_reserved} leaked"
    );

    let low_stock = ledger
        .low_stock_default()?
        .iter()
        .map(StockReport::from)
        .collect();
    let out_of_stock = ledger.out_of_stock()?.iter().map(StockReport::from).collect();

    drop(ledger);
    drop(bus);
    let events = listener
        .join()
        .map_err(|_| anyhow::anyhow!("event listener panicked"))?;

    let report = SimReport {
        workers,
        orders_per_worker,
        outcomes,
        events,
        leaked_reserved,
        low_stock_threshold,
        low_stock,
        out_of_stock,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
