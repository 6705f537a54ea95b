use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard, RwLock};

use stockledger_core::{DomainResult, StockKey, StockRecordId};
use stockledger_inventory::{StockQuery, StockRecord};

use super::r#trait::{RepositoryError, StockRepository};

#[derive(Debug)]
struct Row {
    /// Write gate, held for a whole read-decide-write-notify round.
    /// `false` once the row has been removed from the table.
    gate: Mutex<bool>,
    /// Last committed state; swapped only while the gate is held.
    snapshot: RwLock<StockRecord>,
}

impl Row {
    fn new(record: StockRecord) -> Self {
        Self {
            gate: Mutex::new(true),
            snapshot: RwLock::new(record),
        }
    }

    fn read(&self) -> StockRecord {
        self.snapshot.read().clone()
    }

    fn write(&self, record: StockRecord) {
        *self.snapshot.write() = record;
    }

    /// Wait for the gate until `deadline`.
    fn acquire(
        &self,
        id: StockRecordId,
        deadline: Instant,
    ) -> Result<MutexGuard<'_, bool>, RepositoryError> {
        let started = Instant::now();
        self.gate
            .try_lock_until(deadline)
            .ok_or_else(|| RepositoryError::Contention {
                record_id: id,
                waited: started.elapsed(),
            })
    }
}

#[derive(Debug, Default)]
struct Table {
    by_id: HashMap<StockRecordId, Arc<Row>>,
    by_key: HashMap<StockKey, StockRecordId>,
}

/// In-memory stock table with per-record write gates.
///
/// The table lock only guards membership (insert/remove and the unique key
/// index). Mutations of existing rows take just their own row's gate, so
/// writers on different records proceed in parallel.
///
/// Lock order is gate → table; nothing waits on a gate while holding the table.
#[derive(Debug, Default)]
pub struct InMemoryStockRepository {
    table: RwLock<Table>,
}

impl InMemoryStockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row(&self, id: StockRecordId) -> Option<Arc<Row>> {
        self.table.read().by_id.get(&id).cloned()
    }
}

impl StockRepository for InMemoryStockRepository {
    fn insert(
        &self,
        record: StockRecord,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<StockRecord, RepositoryError> {
        let id = record.id_typed();
        let key = record.key();

        // Nobody else can see the row yet, so its gate is free. Holding it until
        // the hook has run keeps later writers from notifying ahead of creation.
        let row = Arc::new(Row::new(record.clone()));
        let gate = row.gate.lock();

        {
            let mut table = self.table.write();
            if table.by_key.contains_key(&key) {
                return Err(RepositoryError::Duplicate(key));
            }
            if table.by_id.contains_key(&id) {
                return Err(RepositoryError::Backend(format!("record id {id} already present")));
            }
            table.by_key.insert(key, id);
            table.by_id.insert(id, row.clone());
        }

        committed(&record);
        drop(gate);

        Ok(record)
    }

    fn get(&self, id: StockRecordId) -> Result<Option<StockRecord>, RepositoryError> {
        Ok(self.row(id).map(|row| row.read()))
    }

    fn find_by_key(&self, key: StockKey) -> Result<Option<StockRecord>, RepositoryError> {
        let row = {
            let table = self.table.read();
            table
                .by_key
                .get(&key)
                .and_then(|id| table.by_id.get(id))
                .cloned()
        };

        Ok(row.map(|row| row.read()))
    }

    fn query(&self, query: &StockQuery) -> Result<Vec<StockRecord>, RepositoryError> {
        let rows = self
            .table
            .read()
            .by_id
            .values()
            .map(|row| row.read())
            .filter(|snapshot| query.matches(snapshot))
            .collect();

        Ok(query.finish(rows))
    }

    fn modify(
        &self,
        id: StockRecordId,
        deadline: Instant,
        decide: &mut dyn FnMut(&StockRecord) -> DomainResult<StockRecord>,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<StockRecord, RepositoryError> {
        let row = self.row(id).ok_or(RepositoryError::NotFound(id))?;

        let live = row.acquire(id, deadline)?;
        if !*live {
            return Err(RepositoryError::NotFound(id));
        }

        let current = row.read();
        let next = decide(&current)?;
        debug_assert_eq!(next.id_typed(), current.id_typed());
        debug_assert_eq!(next.key(), current.key());

        row.write(next.clone());
        committed(&next);
        drop(live);

        Ok(next)
    }

    fn remove(
        &self,
        id: StockRecordId,
        deadline: Instant,
        check: &mut dyn FnMut(&StockRecord) -> DomainResult<()>,
        committed: &mut dyn FnMut(&StockRecord),
    ) -> Result<Option<StockRecord>, RepositoryError> {
        let Some(row) = self.row(id) else {
            return Ok(None);
        };

        let mut live = row.acquire(id, deadline)?;
        if !*live {
            return Ok(None);
        }

        let current = row.read();
        check(&current)?;

        {
            let mut table = self.table.write();
            table.by_id.remove(&id);
            table.by_key.remove(&current.key());
        }
        *live = false;

        committed(&current);
        drop(live);

        Ok(Some(current))
    }
}
