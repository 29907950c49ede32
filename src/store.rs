use error_stack::{Report, ResultExt};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::config;
use crate::datastore::{Datastore, Filter, FollowRow};
use crate::error::{Error, Result};
use crate::events::{EventBus, FollowEvent};
use crate::identity::Identity;
use crate::record::{FollowRecord, NewFollow};
use crate::registry::{Slot, TargetRegistry};
use crate::target::{EntityType, Target};
use crate::types::id::marker::UserMarker;
use crate::types::Id;

/// What to enumerate follows of: one concrete object, or every object
/// of a kind.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a, T: Target> {
    Object(&'a T),
    Kind(EntityType),
}

impl<T: Target> Clone for Lookup<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Target> Copy for Lookup<'_, T> {}

impl<'a, T: Target> Lookup<'a, T> {
    #[must_use]
    pub fn kind(kind: impl Into<EntityType>) -> Self {
        Self::Kind(kind.into())
    }

    fn entity_type(&self) -> EntityType {
        match self {
            Self::Object(target) => target.entity_type(),
            Self::Kind(entity_type) => *entity_type,
        }
    }
}

impl<'a, T: Target> From<&'a T> for Lookup<'a, T> {
    fn from(target: &'a T) -> Self {
        Self::Object(target)
    }
}

impl<'a, T: Target> From<EntityType> for Lookup<'a, T> {
    fn from(entity_type: EntityType) -> Self {
        Self::Kind(entity_type)
    }
}

/// Creates, checks and enumerates follow records.
///
/// `create` never looks for an existing record, so calling it twice
/// for the same pair stores two records. [`FollowStore::get_or_create`]
/// checks first but is racy across concurrent callers; use
/// [`FollowStore::get_or_create_serialized`] (or turn on
/// `follows.serialize_get_or_create`) when that matters.
pub struct FollowStore<T: Target, D: Datastore> {
    registry: Arc<TargetRegistry>,
    datastore: D,
    events: Arc<EventBus<T>>,
    locks: KeyLocks,
    serialize_get_or_create: bool,
}

impl<T: Target, D: Datastore> FollowStore<T, D> {
    #[must_use]
    pub fn new(registry: Arc<TargetRegistry>, datastore: D) -> Self {
        Self::with_settings(registry, datastore, &config::Follows::default())
    }

    #[must_use]
    pub fn with_settings(
        registry: Arc<TargetRegistry>,
        datastore: D,
        settings: &config::Follows,
    ) -> Self {
        Self {
            registry,
            datastore,
            events: Arc::new(EventBus::new()),
            locks: KeyLocks::new(settings.lock_stripes),
            serialize_get_or_create: settings.serialize_get_or_create,
        }
    }

    /// Shares an existing event bus instead of the store's own.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus<T>>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn datastore(&self) -> &D {
        &self.datastore
    }

    #[must_use]
    pub fn events(&self) -> &Arc<EventBus<T>> {
        &self.events
    }

    /// Stores a new follow record and announces it with
    /// [`FollowEvent::Followed`]. Existing records are not checked.
    #[tracing::instrument(skip_all, name = "follow.store.create", fields(
        user_id = ?user.user_id(),
        target = ?target,
    ))]
    pub async fn create(&self, user: &impl Identity, target: &T) -> Result<FollowRecord<T>> {
        let user_id = require_user(user)?;

        let mut draft = NewFollow::new(user_id);
        draft.set_target(&self.registry, Some(target.clone()))?;

        let row = draft.to_row(&self.registry)?;
        let row = self
            .datastore
            .insert(row)
            .await
            .change_context(Error::Datastore)
            .attach_printable("could not insert follow record")?;

        let record = self.decode(row)?;
        tracing::debug!(id = %record.id, "created follow record");

        self.events.publish(&FollowEvent::Followed(record.clone()));
        Ok(record)
    }

    /// Returns the user's record for `target`, creating it if there is
    /// none. The flag tells whether it was created by this call.
    #[tracing::instrument(skip_all, name = "follow.store.get_or_create", fields(
        user_id = ?user.user_id(),
        target = ?target,
    ))]
    pub async fn get_or_create(
        &self,
        user: &impl Identity,
        target: &T,
    ) -> Result<(FollowRecord<T>, bool)> {
        if self.serialize_get_or_create {
            return self.get_or_create_serialized(user, target).await;
        }
        self.get_or_create_unguarded(user, target).await
    }

    /// Like [`FollowStore::get_or_create`] but callers racing on the same
    /// (user, target) pair within this process take turns, so only one
    /// of them inserts.
    #[tracing::instrument(skip_all, name = "follow.store.get_or_create_serialized", fields(
        user_id = ?user.user_id(),
        target = ?target,
    ))]
    pub async fn get_or_create_serialized(
        &self,
        user: &impl Identity,
        target: &T,
    ) -> Result<(FollowRecord<T>, bool)> {
        let user_id = require_user(user)?;
        let _guard = self.locks.lock(user_id, target).await;
        self.get_or_create_unguarded(&user_id, target).await
    }

    async fn get_or_create_unguarded(
        &self,
        user: &impl Identity,
        target: &T,
    ) -> Result<(FollowRecord<T>, bool)> {
        if self.is_following(user, target).await? {
            let user_id = require_user(user)?;
            let existing = self.find(user_id, target).await?.into_iter().next();
            if let Some(record) = existing {
                return Ok((record, false));
            }
            tracing::debug!("follow record vanished after the check, creating it again");
        }

        Ok((self.create(user, target).await?, true))
    }

    /// Whether the user follows `target`. Anonymous callers never follow
    /// anything and cost no datastore round trip.
    #[tracing::instrument(skip_all, name = "follow.store.is_following", fields(
        user_id = ?user.user_id(),
        target = ?target,
    ))]
    pub async fn is_following(&self, user: &impl Identity, target: &T) -> Result<bool> {
        let user_id = match user.user_id() {
            Some(user_id) if !user.is_anonymous() => user_id,
            _ => return Ok(false),
        };

        let slot = self.resolve(target.entity_type())?;
        let filter = Filter::new().user(user_id).slot_eq(slot, target.object_id());

        let amount = self
            .datastore
            .count(&filter)
            .await
            .change_context(Error::Datastore)?;

        Ok(amount > 0)
    }

    /// Every record following a specific object, or any object of a kind.
    #[tracing::instrument(skip_all, name = "follow.store.get_follows")]
    pub async fn get_follows<'a>(
        &self,
        lookup: impl Into<Lookup<'a, T>>,
    ) -> Result<Vec<FollowRecord<T>>> {
        let lookup = lookup.into();
        let slot = self.resolve(lookup.entity_type())?;
        let rows = self
            .datastore
            .query(&lookup_filter(slot, &lookup))
            .await
            .change_context(Error::Datastore)?;

        self.decode_all(rows)
    }

    /// Same as [`FollowStore::get_follows`], without loading the records.
    #[tracing::instrument(skip_all, name = "follow.store.count_follows")]
    pub async fn count_follows<'a>(&self, lookup: impl Into<Lookup<'a, T>>) -> Result<u64> {
        let lookup = lookup.into();
        let slot = self.resolve(lookup.entity_type())?;
        self.datastore
            .count(&lookup_filter(slot, &lookup))
            .await
            .change_context(Error::Datastore)
    }

    /// Every record owned by the user, oldest first. Anonymous callers
    /// own nothing.
    #[tracing::instrument(skip_all, name = "follow.store.following", fields(
        user_id = ?user.user_id(),
    ))]
    pub async fn following(&self, user: &impl Identity) -> Result<Vec<FollowRecord<T>>> {
        let Some(user_id) = user.user_id() else {
            return Ok(Vec::new());
        };

        let rows = self
            .datastore
            .query(&Filter::new().user(user_id))
            .await
            .change_context(Error::Datastore)?;

        self.decode_all(rows)
    }

    /// Deletes a record and announces it with [`FollowEvent::Unfollowed`].
    /// Returns `false` (and announces nothing) if it was already gone.
    #[tracing::instrument(skip_all, name = "follow.store.delete", fields(id = %record.id))]
    pub async fn delete(&self, record: &FollowRecord<T>) -> Result<bool> {
        let deleted = self
            .datastore
            .delete(record.id)
            .await
            .change_context(Error::Datastore)
            .attach_printable("could not delete follow record")?;

        if deleted.is_none() {
            return Ok(false);
        }

        self.events.publish(&FollowEvent::Unfollowed(record.clone()));
        Ok(true)
    }

    /// Deletes every record the user holds on `target`, including
    /// duplicates, and returns how many were removed.
    #[tracing::instrument(skip_all, name = "follow.store.unfollow", fields(
        user_id = ?user.user_id(),
        target = ?target,
    ))]
    pub async fn unfollow(&self, user: &impl Identity, target: &T) -> Result<usize> {
        let Some(user_id) = user.user_id() else {
            return Ok(0);
        };

        let mut removed = 0;
        for record in self.find(user_id, target).await? {
            if self.delete(&record).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn find(&self, user_id: Id<UserMarker>, target: &T) -> Result<Vec<FollowRecord<T>>> {
        let slot = self.resolve(target.entity_type())?;
        let filter = Filter::new().user(user_id).slot_eq(slot, target.object_id());
        let rows = self
            .datastore
            .query(&filter)
            .await
            .change_context(Error::Datastore)?;

        self.decode_all(rows)
    }

    fn resolve(&self, entity_type: EntityType) -> Result<&Slot> {
        self.registry
            .resolve(entity_type)
            .change_context(Error::UnregisteredKind)
    }

    fn decode(&self, row: FollowRow) -> Result<FollowRecord<T>> {
        FollowRecord::from_row(row, &self.registry)
    }

    fn decode_all(&self, rows: Vec<FollowRow>) -> Result<Vec<FollowRecord<T>>> {
        rows.into_iter().map(|row| self.decode(row)).collect()
    }
}

impl<T: Target, D: Datastore + std::fmt::Debug> std::fmt::Debug for FollowStore<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowStore")
            .field("registry", &self.registry)
            .field("datastore", &self.datastore)
            .field("events", &self.events)
            .field("serialize_get_or_create", &self.serialize_get_or_create)
            .finish_non_exhaustive()
    }
}

fn require_user(user: &impl Identity) -> Result<Id<UserMarker>> {
    user.user_id().ok_or_else(|| {
        Report::new(Error::Validation).attach_printable("anonymous users cannot follow anything")
    })
}

fn lookup_filter<'s, T: Target>(slot: &'s Slot, lookup: &Lookup<'_, T>) -> Filter<'s> {
    match lookup {
        Lookup::Object(target) => Filter::new().slot_eq(slot, target.object_id()),
        Lookup::Kind(..) => Filter::new().slot_not_null(slot),
    }
}

/// Striped async locks keyed by (user, kind, object).
struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLocks {
    fn new(stripes: NonZeroUsize) -> Self {
        Self {
            stripes: (0..stripes.get()).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock<T: Target>(&self, user_id: Id<UserMarker>, target: &T) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        target.entity_type().hash(&mut hasher);
        target.object_id().hash(&mut hasher);

        // the remainder is always below the stripe count
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}
