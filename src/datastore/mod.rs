//! Persistence collaborator of the [follow store](crate::FollowStore).
//!
//! A datastore only ever sees follow rows in their single-table shape:
//! the owning user, the creation time and one nullable cell per
//! registered [slot](crate::Slot), in registration order. Turning rows
//! into typed targets is the store's business.
use chrono::NaiveDateTime;
use std::future::Future;

use crate::registry::Slot;
use crate::types::id::marker::{FollowMarker, UserMarker};
use crate::types::Id;

mod error;
pub mod memory;
pub mod postgres;

pub use self::error::*;
pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

/// A follow row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFollowRow {
    pub user_id: Id<UserMarker>,
    pub created_at: NaiveDateTime,
    pub slots: Vec<Option<i64>>,
}

/// A persisted follow row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRow {
    pub id: Id<FollowMarker>,
    pub user_id: Id<UserMarker>,
    pub created_at: NaiveDateTime,
    pub slots: Vec<Option<i64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPredicate {
    /// The slot holds exactly this object id.
    Equals(i64),
    /// The slot holds any object id.
    NotNull,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotFilter<'a> {
    pub slot: &'a Slot,
    pub predicate: SlotPredicate,
}

impl SlotFilter<'_> {
    #[must_use]
    pub fn matches(&self, slots: &[Option<i64>]) -> bool {
        let value = slots.get(self.slot.index()).copied().flatten();
        match (self.predicate, value) {
            (SlotPredicate::Equals(expected), Some(actual)) => expected == actual,
            (SlotPredicate::NotNull, Some(..)) => true,
            (_, None) => false,
        }
    }
}

/// Conjunction of optional conditions; an empty filter matches every row.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filter<'a> {
    pub user_id: Option<Id<UserMarker>>,
    pub slot: Option<SlotFilter<'a>>,
}

impl<'a> Filter<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn user(mut self, user_id: Id<UserMarker>) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn slot_eq(mut self, slot: &'a Slot, object_id: i64) -> Self {
        self.slot = Some(SlotFilter {
            slot,
            predicate: SlotPredicate::Equals(object_id),
        });
        self
    }

    #[must_use]
    pub fn slot_not_null(mut self, slot: &'a Slot) -> Self {
        self.slot = Some(SlotFilter {
            slot,
            predicate: SlotPredicate::NotNull,
        });
        self
    }

    #[must_use]
    pub fn matches(&self, row: &FollowRow) -> bool {
        self.user_id.map_or(true, |id| id == row.user_id)
            && self.slot.map_or(true, |slot| slot.matches(&row.slots))
    }
}

/// Abstract CRUD surface the follow store persists through.
///
/// Implementations must return rows ordered by ascending id from
/// [`Datastore::query`]. Every future is `Send` so store operations
/// can be spawned onto a multi-threaded runtime; implementors may still
/// write plain `async fn`s.
pub trait Datastore: Send + Sync {
    fn insert(&self, row: NewFollowRow) -> impl Future<Output = Result<FollowRow>> + Send;

    /// Removes a row, returning it if it was still there.
    fn delete(
        &self,
        id: Id<FollowMarker>,
    ) -> impl Future<Output = Result<Option<FollowRow>>> + Send;

    fn query(&self, filter: &Filter<'_>) -> impl Future<Output = Result<Vec<FollowRow>>> + Send;

    fn count(&self, filter: &Filter<'_>) -> impl Future<Output = Result<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TargetRegistry;
    use crate::test_utils::{self, FollowableKind};

    fn row(user: u64, slots: Vec<Option<i64>>) -> FollowRow {
        FollowRow {
            id: Id::new(1),
            user_id: Id::new(user),
            created_at: test_utils::now(),
            slots,
        }
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn filters_combine_user_and_slot_conditions() {
        let registry: TargetRegistry = test_utils::registry();
        let post = registry.resolve(FollowableKind::Post).unwrap();
        let topic = registry.resolve(FollowableKind::Topic).unwrap();

        let alice_post = row(1, vec![Some(10), None, None]);

        assert!(Filter::new().matches(&alice_post));
        assert!(Filter::new().user(Id::new(1)).matches(&alice_post));
        assert!(!Filter::new().user(Id::new(2)).matches(&alice_post));

        assert!(Filter::new().slot_eq(post, 10).matches(&alice_post));
        assert!(!Filter::new().slot_eq(post, 11).matches(&alice_post));
        assert!(Filter::new().slot_not_null(post).matches(&alice_post));
        assert!(!Filter::new().slot_not_null(topic).matches(&alice_post));

        assert!(!Filter::new()
            .user(Id::new(2))
            .slot_eq(post, 10)
            .matches(&alice_post));
    }
}
