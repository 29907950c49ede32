use error_stack::{Report, Result};
use heck::ToSnakeCase;
use std::collections::HashMap;
use thiserror::Error;

use crate::target::EntityType;

/// Columns every follow row carries regardless of the registered kinds.
const RESERVED_COLUMNS: &[&str] = &["id", "user_id", "created_at"];

// Postgres truncates identifiers longer than this
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} is not a registered followable kind")]
    UnregisteredKind(EntityType),
    #[error("{0} is already registered")]
    DuplicateKind(EntityType),
    #[error("slot {0:?} is already taken by another kind")]
    DuplicateSlot(String),
    #[error("{0:?} is not a valid slot name")]
    InvalidSlotName(String),
}

/// The storage slot reserved for one followable kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    index: usize,
    entity_type: EntityType,
    name: String,
}

impl Slot {
    /// Position of this slot in registration order.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Column (or field) name holding the followed object's id.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Immutable mapping from each followable kind to its slot.
///
/// Build it once at startup with [`TargetRegistry::builder`] and share
/// it through an `Arc`; nothing can be registered afterwards.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    slots: Vec<Slot>,
    by_type: HashMap<EntityType, usize>,
}

impl TargetRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn resolve(&self, entity_type: impl Into<EntityType>) -> Result<&Slot, RegistryError> {
        let entity_type = entity_type.into();
        self.by_type
            .get(&entity_type)
            .map(|index| &self.slots[*index])
            .ok_or_else(|| Report::new(RegistryError::UnregisteredKind(entity_type)))
    }

    #[must_use]
    pub fn contains(&self, entity_type: impl Into<EntityType>) -> bool {
        self.by_type.contains_key(&entity_type.into())
    }

    /// Every slot in registration order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: TargetRegistry,
}

impl RegistryBuilder {
    /// Registers a kind under a slot named after it (`BlogPost` becomes
    /// `blog_post`) and returns that slot name.
    pub fn register(&mut self, entity_type: impl Into<EntityType>) -> Result<&str, RegistryError> {
        let entity_type = entity_type.into();
        let name = entity_type.name().to_snake_case();
        self.register_as(entity_type, name)
    }

    /// Registers a kind under an explicit slot name.
    pub fn register_as(
        &mut self,
        entity_type: impl Into<EntityType>,
        slot: impl Into<String>,
    ) -> Result<&str, RegistryError> {
        let entity_type = entity_type.into();
        let name = slot.into();

        if !is_valid_slot_name(&name) {
            return Err(Report::new(RegistryError::InvalidSlotName(name))
                .attach_printable("slot names must be lowercase ascii identifiers"));
        }

        if RESERVED_COLUMNS.contains(&name.as_str()) {
            return Err(Report::new(RegistryError::InvalidSlotName(name))
                .attach_printable("slot name collides with a built-in column"));
        }

        let registry = &mut self.registry;
        if registry.by_type.contains_key(&entity_type) {
            return Err(Report::new(RegistryError::DuplicateKind(entity_type)));
        }

        if registry.slots.iter().any(|slot| slot.name == name) {
            return Err(Report::new(RegistryError::DuplicateSlot(name))
                .attach_printable(format!("while registering {entity_type}")));
        }

        let index = registry.slots.len();
        tracing::debug!(%entity_type, slot = %name, "registered followable kind");

        registry.by_type.insert(entity_type, index);
        registry.slots.push(Slot {
            index,
            entity_type,
            name,
        });

        Ok(&registry.slots[index].name)
    }

    #[must_use]
    pub fn build(self) -> TargetRegistry {
        self.registry
    }
}

fn is_valid_slot_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= MAX_IDENTIFIER_LEN
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FollowableKind;
    use static_assertions::assert_impl_all;

    assert_impl_all!(TargetRegistry: Send, Sync, Clone);

    #[test]
    fn register_derives_snake_case_slots() {
        let mut builder = TargetRegistry::builder();
        assert_eq!("post", builder.register(FollowableKind::Post).unwrap());
        assert_eq!(
            "blog_post",
            builder.register(EntityType::new("BlogPost")).unwrap()
        );

        let registry = builder.build();
        assert_eq!(2, registry.len());
        assert_eq!("post", registry.resolve(FollowableKind::Post).unwrap().name());
        assert_eq!(1, registry.resolve(EntityType::new("BlogPost")).unwrap().index());
    }

    #[test]
    fn slots_keep_registration_order() {
        let mut builder = TargetRegistry::builder();
        builder.register(FollowableKind::Topic).unwrap();
        builder.register_as(FollowableKind::Post, "article").unwrap();
        let registry = builder.build();

        let order = registry
            .slots()
            .iter()
            .map(|slot| (slot.entity_type().name(), slot.name()))
            .collect::<Vec<_>>();

        assert_eq!(vec![("Topic", "topic"), ("Post", "article")], order);
    }

    #[test]
    fn resolve_rejects_unregistered_kinds() {
        let mut builder = TargetRegistry::builder();
        builder.register(FollowableKind::Post).unwrap();
        let registry = builder.build();

        let error = registry.resolve(FollowableKind::Topic).unwrap_err();
        assert!(matches!(
            error.current_context(),
            RegistryError::UnregisteredKind(kind) if kind.name() == "Topic"
        ));
        assert!(!registry.contains(FollowableKind::Topic));
    }

    #[test]
    fn register_rejects_conflicts() {
        let mut builder = TargetRegistry::builder();
        builder.register(FollowableKind::Post).unwrap();

        let error = builder.register(FollowableKind::Post).unwrap_err();
        assert!(matches!(error.current_context(), RegistryError::DuplicateKind(..)));

        let error = builder.register_as(FollowableKind::Topic, "post").unwrap_err();
        assert!(matches!(error.current_context(), RegistryError::DuplicateSlot(..)));

        // failed registrations leave no trace behind
        assert_eq!(1, builder.build().len());
    }

    #[test]
    fn register_rejects_bad_slot_names() {
        let mut builder = TargetRegistry::builder();
        for name in ["", "Post", "1post", "post; drop table follows", "user_id", "id"] {
            let error = builder.register_as(FollowableKind::Post, name).unwrap_err();
            assert!(
                matches!(error.current_context(), RegistryError::InvalidSlotName(..)),
                "{name:?} should be rejected"
            );
        }
    }
}
