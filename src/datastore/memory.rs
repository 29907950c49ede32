use error_stack::Report;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Datastore, Error, Filter, FollowRow, NewFollowRow, Result};
use crate::registry::TargetRegistry;
use crate::types::id::marker::FollowMarker;
use crate::types::Id;

/// In-process datastore keeping every follow row in a single table,
/// one cell per registered slot.
#[derive(Debug)]
pub struct MemoryStore {
    width: usize,
    table: Mutex<Table>,
}

#[derive(Debug, Default)]
struct Table {
    last_id: u64,
    rows: Vec<FollowRow>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(registry: &TargetRegistry) -> Self {
        Self {
            width: registry.len(),
            table: Mutex::new(Table::default()),
        }
    }

    /// Amount of rows currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Rows are plain data, a panicking holder cannot leave them half-written
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Datastore for MemoryStore {
    #[tracing::instrument(skip_all, name = "follow.db.memory.insert")]
    async fn insert(&self, row: NewFollowRow) -> Result<FollowRow> {
        if row.slots.len() != self.width {
            return Err(Report::new(Error::SlotCount {
                expected: self.width,
                actual: row.slots.len(),
            }));
        }

        let mut table = self.table();
        table.last_id += 1;

        let id = Id::<FollowMarker>::new_checked(table.last_id).ok_or_else(|| {
            Report::new(Error::Exhausted)
        })?;

        let row = FollowRow {
            id,
            user_id: row.user_id,
            created_at: row.created_at,
            slots: row.slots,
        };
        table.rows.push(row.clone());

        Ok(row)
    }

    #[tracing::instrument(skip_all, name = "follow.db.memory.delete", fields(id = %id))]
    async fn delete(&self, id: Id<FollowMarker>) -> Result<Option<FollowRow>> {
        let mut table = self.table();
        let position = table.rows.iter().position(|row| row.id == id);
        Ok(position.map(|index| table.rows.remove(index)))
    }

    #[tracing::instrument(skip_all, name = "follow.db.memory.query")]
    async fn query(&self, filter: &Filter<'_>) -> Result<Vec<FollowRow>> {
        let rows = self
            .table()
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();

        Ok(rows)
    }

    #[tracing::instrument(skip_all, name = "follow.db.memory.count")]
    async fn count(&self, filter: &Filter<'_>) -> Result<u64> {
        let amount = self
            .table()
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .count();

        Ok(u64::try_from(amount).unwrap_or(u64::MAX))
    }
}
