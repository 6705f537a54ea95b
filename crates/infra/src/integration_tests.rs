//! Integration tests for the full ledger pipeline.
//!
//! Tests: Ledger → Repository (per-record gate) → EventBus
//!
//! Verifies:
//! - Concurrent reservations never oversell
//! - Creation is unique per (product, location) under concurrency
//! - Writers on different records do not serialize on each other
//! - Published envelopes follow commit order per record

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use stockledger_core::{AggregateRoot, LocationId, ProductId, StockRecordId};
    use stockledger_events::{EventBus, InMemoryEventBus};
    use stockledger_inventory::{
        ReservationDeletePolicy, StockEvent, StockQuery, StockRecord, StockSort,
    };

    use crate::config::LedgerConfig;
    use crate::ledger::{LedgerError, StockEnvelope, StockLedger, StockPatch};
    use crate::repository::{InMemoryStockRepository, StockRepository};

    type SharedLedger =
        Arc<StockLedger<Arc<InMemoryStockRepository>, Arc<InMemoryEventBus<StockEnvelope>>>>;

    fn test_config() -> LedgerConfig {
        LedgerConfig::default().with_lock_timeout(Duration::from_secs(10))
    }

    fn setup_with(config: LedgerConfig) -> (SharedLedger, Arc<InMemoryEventBus<StockEnvelope>>) {
        let repository = Arc::new(InMemoryStockRepository::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let ledger = Arc::new(StockLedger::with_bus(repository, bus.clone(), config));
        (ledger, bus)
    }

    fn setup() -> (SharedLedger, Arc<InMemoryEventBus<StockEnvelope>>) {
        setup_with(test_config())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(42)
    }

    fn test_location_id() -> LocationId {
        LocationId::new(7)
    }

    /// Run `task` on `n` threads released together; collect results in spawn order.
    fn run_concurrently<T, F>(n: usize, task: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        let barrier = Arc::new(Barrier::new(n));
        let task = Arc::new(task);
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let barrier = barrier.clone();
                let task = task.clone();
                thread::spawn(move || {
                    barrier.wait();
                    task(i)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker thread panicked"))
            .collect()
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        let (ledger, _bus) = setup();
        let id = ledger
            .create(test_product_id(), test_location_id(), 5, 0)
            .unwrap()
            .id_typed();

        let worker = ledger.clone();
        let results = run_concurrently(10, move |_| worker.reserve(id, 1));

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 5);
        for failure in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(
                failure,
                &LedgerError::InsufficientStock {
                    requested: 1,
                    available: 0
                }
            );
        }

        let record = ledger.get(id).unwrap();
        assert_eq!(record.on_hand(), 5);
        assert_eq!(record.reserved(), 5);
        assert_eq!(record.available(), 0);
    }

    #[test]
    fn concurrent_reservations_below_capacity_all_succeed() {
        let (ledger, _bus) = setup();
        let id = ledger
            .create(test_product_id(), test_location_id(), 100, 0)
            .unwrap()
            .id_typed();

        let worker = ledger.clone();
        let results = run_concurrently(16, move |_| worker.reserve(id, 3));

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(ledger.get(id).unwrap().reserved(), 48);
    }

    #[test]
    fn concurrent_mixed_operations_preserve_invariants() {
        let (ledger, _bus) = setup();
        let id = ledger
            .create(test_product_id(), test_location_id(), 50, 0)
            .unwrap()
            .id_typed();

        let worker = ledger.clone();
        run_concurrently(24, move |i| {
            for _ in 0..20 {
                let _ = match i % 4 {
                    0 => worker.reserve(id, 2),
                    1 => worker.release(id, 1),
                    2 => worker.fulfill(id, 1),
                    _ => worker.adjust(id, 1),
                };
            }
        });

        let record = ledger.get(id).unwrap();
        assert!(record.reserved() >= 0);
        assert!(record.reserved() <= record.on_hand());
        assert_eq!(record.available(), record.on_hand() - record.reserved());
    }

    #[test]
    fn concurrent_creates_for_same_pair_yield_one_record() {
        let (ledger, _bus) = setup();

        let worker = ledger.clone();
        let results = run_concurrently(8, move |i| {
            worker.create(test_product_id(), test_location_id(), i as i64, 0)
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(LedgerError::DuplicateKey(_))))
                .count(),
            7
        );
        assert_eq!(ledger.list_all().unwrap().len(), 1);
    }

    #[test]
    fn writers_on_different_records_proceed_independently() {
        let repository = Arc::new(InMemoryStockRepository::new());
        let ledger = Arc::new(StockLedger::new(repository.clone(), test_config()));
        let busy = ledger.create(ProductId::new(1), test_location_id(), 10, 0).unwrap();
        let other = ledger.create(ProductId::new(2), test_location_id(), 10, 0).unwrap();

        // Hold the first record's gate from another thread for a while.
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder_repo = repository.clone();
        let busy_id = busy.id_typed();
        let holder = thread::spawn(move || {
            holder_repo
                .modify(
                    busy_id,
                    std::time::Instant::now() + Duration::from_secs(5),
                    &mut |current: &StockRecord| {
                        let _ = entered_tx.send(());
                        let _ = release_rx.recv_timeout(Duration::from_secs(5));
                        Ok(current.clone())
                    },
                    &mut |_: &StockRecord| {},
                )
                .map(|_| ())
        });
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The other record is unaffected, and the busy one is still readable.
        assert_eq!(ledger.reserve(other.id_typed(), 4).unwrap().reserved(), 4);
        assert_eq!(ledger.get(busy_id).unwrap().on_hand(), 10);

        release_tx.send(()).unwrap();
        holder.join().unwrap().unwrap();
    }

    #[test]
    fn busy_record_times_out_with_retryable_contention() {
        let repository = Arc::new(InMemoryStockRepository::new());
        let config = LedgerConfig::default().with_lock_timeout(Duration::from_millis(20));
        let ledger = StockLedger::new(repository.clone(), config);
        let id = ledger
            .create(test_product_id(), test_location_id(), 10, 0)
            .unwrap()
            .id_typed();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder_repo = repository.clone();
        let holder = thread::spawn(move || {
            holder_repo
                .modify(
                    id,
                    std::time::Instant::now() + Duration::from_secs(5),
                    &mut |current: &StockRecord| {
                        let _ = entered_tx.send(());
                        let _ = release_rx.recv_timeout(Duration::from_secs(5));
                        Ok(current.clone())
                    },
                    &mut |_: &StockRecord| {},
                )
                .map(|_| ())
        });
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let err = ledger.reserve(id, 1).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "contention");

        release_tx.send(()).unwrap();
        holder.join().unwrap().unwrap();

        // Retrying after the holder is done succeeds.
        assert_eq!(ledger.reserve(id, 1).unwrap().reserved(), 1);
    }

    #[test]
    fn delete_racing_with_reservation_never_resurrects_record() {
        let config = test_config().with_delete_policy(ReservationDeletePolicy::Discard);
        let (ledger, _bus) = setup_with(config);
        let id = ledger
            .create(test_product_id(), test_location_id(), 100, 0)
            .unwrap()
            .id_typed();

        let worker = ledger.clone();
        let results = run_concurrently(8, move |i| {
            if i == 0 {
                worker.delete(id).map(|_| None)
            } else {
                worker.reserve(id, 1).map(Some)
            }
        });

        for result in &results[1..] {
            assert!(matches!(result, Ok(Some(_)) | Err(LedgerError::NotFound)));
        }
        assert_eq!(ledger.get(id).unwrap_err(), LedgerError::NotFound);
        assert!(ledger.find(test_product_id(), test_location_id()).is_err());
    }

    #[test]
    fn envelopes_are_published_in_commit_order() {
        let (ledger, bus) = setup();
        let subscription = bus.subscribe();
        let id = ledger
            .create(test_product_id(), test_location_id(), 1_000, 0)
            .unwrap()
            .id_typed();

        let worker = ledger.clone();
        run_concurrently(8, move |_| {
            for _ in 0..10 {
                worker.reserve(id, 1).unwrap();
            }
        });

        let envelopes = subscription.drain();
        assert_eq!(envelopes.len(), 81);

        // Delivery order, not sorted: each envelope is the next version.
        let seqs: Vec<u64> = envelopes.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, (1..=81).collect::<Vec<_>>());
        assert_eq!(ledger.get(id).unwrap().reserved(), 80);
        assert!(matches!(envelopes[0].payload(), StockEvent::StockCreated(_)));
    }

    #[test]
    fn heavy_contention_delivers_each_record_stream_without_gaps_or_inversions() {
        let (ledger, bus) = setup();
        let subscription = bus.subscribe();
        let first = ledger
            .create(ProductId::new(1), test_location_id(), 0, 0)
            .unwrap()
            .id_typed();
        let second = ledger
            .create(ProductId::new(2), test_location_id(), 0, 0)
            .unwrap()
            .id_typed();

        let worker = ledger.clone();
        run_concurrently(8, move |i| {
            let id = if i % 2 == 0 { first } else { second };
            for _ in 0..2_000 {
                worker.adjust(id, 1).unwrap();
            }
        });

        let envelopes = subscription.drain();
        assert_eq!(envelopes.len(), 2 + 8 * 2_000);

        // A consumer that drops anything not newer than what it has seen
        // must not lose a single event.
        let mut last_seen = std::collections::HashMap::new();
        for envelope in &envelopes {
            let last = last_seen.entry(envelope.record_id()).or_insert(0u64);
            assert_eq!(envelope.sequence_number(), *last + 1);
            *last = envelope.sequence_number();
        }
        assert_eq!(last_seen[&first], 1 + 4 * 2_000);
        assert_eq!(last_seen[&second], 1 + 4 * 2_000);
        assert_eq!(ledger.get(first).unwrap().on_hand(), 4 * 2_000);
    }

    #[test]
    fn delete_envelope_follows_the_last_mutation() {
        let config = test_config().with_delete_policy(ReservationDeletePolicy::Discard);
        let (ledger, bus) = setup_with(config);
        let subscription = bus.subscribe();
        let id = ledger
            .create(test_product_id(), test_location_id(), 1_000, 0)
            .unwrap()
            .id_typed();

        let worker = ledger.clone();
        run_concurrently(6, move |i| {
            if i == 0 {
                thread::sleep(Duration::from_millis(2));
                let _ = worker.delete(id);
            } else {
                for _ in 0..200 {
                    if worker.reserve(id, 1).is_err() {
                        break;
                    }
                }
            }
        });

        let envelopes = subscription.drain();
        let seqs: Vec<u64> = envelopes.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, (1..=envelopes.len() as u64).collect::<Vec<_>>());
        assert!(matches!(
            envelopes.last().map(|e| e.payload()),
            Some(StockEvent::StockDeleted(_))
        ));
    }

    #[test]
    fn last_updated_follows_commit_order() {
        let (ledger, _bus) = setup();
        let id = ledger
            .create(test_product_id(), test_location_id(), 10, 0)
            .unwrap()
            .id_typed();

        let mut previous = ledger.get(id).unwrap().last_updated();
        for delta in [1, -1, 0, 5] {
            let next = ledger.adjust(id, delta).unwrap().last_updated();
            assert!(next >= previous);
            previous = next;
        }

        // A rejected operation does not touch the timestamp.
        let _ = ledger.reserve(id, 1_000);
        assert_eq!(ledger.get(id).unwrap().last_updated(), previous);
    }

    #[test]
    fn warehouse_day_scenario() {
        let (ledger, _bus) = setup();
        let widgets = ProductId::new(1);
        let gadgets = ProductId::new(2);
        let north = LocationId::new(10);
        let south = LocationId::new(20);

        let wn = ledger.create(widgets, north, 100, 0).unwrap().id_typed();
        let ws = ledger.create(widgets, south, 8, 0).unwrap().id_typed();
        let gn = ledger.create(gadgets, north, 0, 0).unwrap().id_typed();

        ledger.reserve(wn, 30).unwrap();
        ledger.fulfill(wn, 20).unwrap();
        ledger.adjust_with_reason(gn, 12, Some("inbound shipment".to_string())).unwrap();
        ledger.reserve(ws, 8).unwrap();

        let wn_record = ledger.find(widgets, north).unwrap();
        assert_eq!(
            (wn_record.on_hand(), wn_record.reserved(), wn_record.available()),
            (80, 10, 70)
        );

        let out: Vec<StockRecordId> = ledger.out_of_stock().unwrap().iter().map(|r| r.id_typed()).collect();
        assert_eq!(out, vec![ws]);

        let sorted = ledger
            .query(&StockQuery::by_product(widgets).sorted_by(StockSort::AvailableAscending))
            .unwrap();
        let ids: Vec<_> = sorted.iter().map(|r| r.id_typed()).collect();
        assert_eq!(ids, vec![ws, wn]);

        assert_eq!(ledger.list_by_location(north).unwrap().len(), 2);
        assert_eq!(ledger.low_stock_default().unwrap().len(), 1);

        ledger.update(gn, StockPatch::on_hand(3)).unwrap();
        assert_eq!(ledger.low_stock_default().unwrap().len(), 2);

        assert!(matches!(
            ledger.delete(ws),
            Err(LedgerError::ReservationsOutstanding { reserved: 8 })
        ));
        ledger.fulfill(ws, 8).unwrap();
        assert!(ledger.delete(ws).unwrap());
        assert_eq!(ledger.list_by_product(widgets).unwrap().len(), 1);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Adjust(i64),
            Reserve(i64),
            Release(i64),
            Fulfill(i64),
            Overwrite(Option<i64>, Option<i64>),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (-60i64..60).prop_map(Op::Adjust),
                (-5i64..40).prop_map(Op::Reserve),
                (-5i64..40).prop_map(Op::Release),
                (-5i64..40).prop_map(Op::Fulfill),
                (proptest::option::of(-5i64..120), proptest::option::of(-5i64..120))
                    .prop_map(|(o, r)| Op::Overwrite(o, r)),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Whatever the request mix, the ledger either applies a request
            /// whole or leaves the record exactly as it was.
            #[test]
            fn ledger_operations_are_all_or_nothing(
                on_hand in 0i64..100,
                ops in proptest::collection::vec(op(), 1..40),
            ) {
                let (ledger, _bus) = setup();
                let id = ledger
                    .create(test_product_id(), test_location_id(), on_hand, 0)
                    .unwrap()
                    .id_typed();

                for op in ops {
                    let before = ledger.get(id).unwrap();
                    let result = match op {
                        Op::Adjust(d) => ledger.adjust(id, d),
                        Op::Reserve(q) => ledger.reserve(id, q),
                        Op::Release(q) => ledger.release(id, q),
                        Op::Fulfill(q) => ledger.fulfill(id, q),
                        Op::Overwrite(on_hand, reserved) => ledger.update(
                            id,
                            StockPatch { on_hand, reserved, ..StockPatch::default() },
                        ),
                    };
                    let after = ledger.get(id).unwrap();

                    match result {
                        Ok(returned) => {
                            prop_assert_eq!(&returned, &after);
                            prop_assert_eq!(after.version(), before.version() + 1);
                        }
                        Err(_) => prop_assert_eq!(&after, &before),
                    }
                    prop_assert!(after.reserved() >= 0);
                    prop_assert!(after.reserved() <= after.on_hand());
                }
            }
        }
    }
}
