//! Fixtures shared by unit tests across the crate.
use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::datastore::{self, Datastore, Filter, FollowRow, NewFollowRow};
use crate::record::FollowRecord;
use crate::registry::TargetRegistry;
use crate::types::id::marker::{FollowMarker, UserMarker};
use crate::types::Id;

crate::targets! {
    pub enum Followable: FollowableKind {
        Post(i64),
        Topic(i64),
        Member(Id<UserMarker>),
    }
}

pub fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Registers `Post`, `Topic` and `Member`, in that order.
#[allow(clippy::unwrap_used)]
pub fn registry() -> TargetRegistry {
    let mut builder = TargetRegistry::builder();
    builder.register(FollowableKind::Post).unwrap();
    builder.register(FollowableKind::Topic).unwrap();
    builder.register(FollowableKind::Member).unwrap();
    builder.build()
}

#[allow(clippy::unwrap_used)]
pub fn record(id: u64, user: u64, target: Followable) -> FollowRecord<Followable> {
    let registry = registry();
    let mut slots = vec![None; registry.len()];
    let slot = registry.resolve(crate::Target::entity_type(&target)).unwrap();
    slots[slot.index()] = Some(crate::Target::object_id(&target));

    let row = FollowRow {
        id: Id::new(id),
        user_id: Id::new(user),
        created_at: now(),
        slots,
    };
    FollowRecord::from_row(row, &registry).unwrap()
}

/// Wraps a datastore and counts how often each operation is called.
#[derive(Debug)]
pub struct CountingStore<D> {
    pub inner: D,
    pub inserts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub queries: AtomicUsize,
    pub counts: AtomicUsize,
}

impl<D> CountingStore<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            inserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
        }
    }

    /// Every call made so far, regardless of the operation.
    pub fn calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
            + self.queries.load(Ordering::SeqCst)
            + self.counts.load(Ordering::SeqCst)
    }
}

impl<D: Datastore> Datastore for CountingStore<D> {
    async fn insert(&self, row: NewFollowRow) -> datastore::Result<FollowRow> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(row).await
    }

    async fn delete(&self, id: Id<FollowMarker>) -> datastore::Result<Option<FollowRow>> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }

    async fn query(&self, filter: &Filter<'_>) -> datastore::Result<Vec<FollowRow>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(filter).await
    }

    // Yields after counting so concurrent callers interleave between
    // the existence check and the insert.
    async fn count(&self, filter: &Filter<'_>) -> datastore::Result<u64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        let amount = self.inner.count(filter).await;
        tokio::task::yield_now().await;
        amount
    }
}
