use chrono::NaiveDateTime;
use error_stack::{Report, Result, ResultExt};
use std::fmt::Display;

use crate::datastore::{FollowRow, NewFollowRow};
use crate::error::Error;
use crate::registry::TargetRegistry;
use crate::target::{Kind, Target};
use crate::types::id::marker::{FollowMarker, UserMarker};
use crate::types::Id;

/// A follow record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFollow<T: Target> {
    pub user_id: Id<UserMarker>,
    pub created_at: NaiveDateTime,
    target: Option<T>,
}

impl<T: Target> NewFollow<T> {
    /// Starts a detached record owned by `user_id`, stamped with the
    /// current time.
    #[must_use]
    pub fn new(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            created_at: chrono::Utc::now().naive_utc(),
            target: None,
        }
    }

    /// Replaces the target. Passing `None` detaches the record.
    ///
    /// Fails with [`Error::UnregisteredKind`] if the target's kind has
    /// no slot, in which case the record is left detached.
    pub fn set_target(&mut self, registry: &TargetRegistry, target: Option<T>) -> Result<(), Error> {
        self.target = None;

        let Some(target) = target else {
            return Ok(());
        };

        registry
            .resolve(target.entity_type())
            .change_context(Error::UnregisteredKind)?;

        self.target = Some(target);
        Ok(())
    }

    #[must_use]
    pub fn target(&self) -> Option<&T> {
        self.target.as_ref()
    }

    /// Lays the record out as a row: every slot empty except the
    /// one belonging to the target's kind.
    pub fn to_row(&self, registry: &TargetRegistry) -> Result<NewFollowRow, Error> {
        let mut slots = vec![None; registry.len()];
        if let Some(target) = &self.target {
            let slot = registry
                .resolve(target.entity_type())
                .change_context(Error::UnregisteredKind)?;

            slots[slot.index()] = Some(target.object_id());
        }

        Ok(NewFollowRow {
            user_id: self.user_id,
            created_at: self.created_at,
            slots,
        })
    }
}

/// A persisted follow edge between a user and one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRecord<T: Target> {
    pub id: Id<FollowMarker>,
    pub user_id: Id<UserMarker>,
    pub created_at: NaiveDateTime,
    target: Option<T>,
}

impl<T: Target> FollowRecord<T> {
    /// The followed object. `None` only for detached rows, which the
    /// store never produces itself.
    #[must_use]
    pub fn target(&self) -> Option<&T> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.target.is_none()
    }

    /// Rebuilds a record from its row. The target is the first filled
    /// slot in registration order.
    pub fn from_row(row: FollowRow, registry: &TargetRegistry) -> Result<Self, Error> {
        if row.slots.len() != registry.len() {
            return Err(Report::new(Error::InvalidRecord).attach_printable(format!(
                "row {} has {} slots but {} are registered",
                row.id,
                row.slots.len(),
                registry.len()
            )));
        }

        let filled = registry
            .slots()
            .iter()
            .zip(&row.slots)
            .find_map(|(slot, value)| value.map(|object_id| (slot, object_id)));

        let target = match filled {
            Some((slot, object_id)) => {
                let kind = T::Kind::from_entity_type(slot.entity_type()).ok_or_else(|| {
                    Report::new(Error::InvalidRecord).attach_printable(format!(
                        "slot {:?} belongs to {} which is not a known target kind",
                        slot.name(),
                        slot.entity_type()
                    ))
                })?;

                let target = T::from_object_id(kind, object_id).ok_or_else(|| {
                    Report::new(Error::InvalidRecord).attach_printable(format!(
                        "{object_id} is not a valid {} id",
                        slot.entity_type()
                    ))
                })?;

                Some(target)
            }
            None => None,
        };

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            created_at: row.created_at,
            target,
        })
    }
}

impl<T: Target> Display for FollowRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}#{}", target.entity_type(), target.object_id()),
            None => f.write_str("<detached>"),
        }
    }
}
