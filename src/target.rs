use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::types::id::{marker::Marker, Id};

/// Name of a followable entity type such as `"Post"` or `"Topic"`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityType(&'static str);

impl EntityType {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl Debug for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityType({})", self.0)
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Type-level tag of a [`Target`] variant, e.g. `FollowableKind::Post`.
pub trait Kind: Debug + Clone + Copy + PartialEq + Eq + Hash + Send + Sync + 'static {
    fn entity_type(self) -> EntityType;

    fn from_entity_type(entity_type: EntityType) -> Option<Self>;
}

/// An object users can follow. Implementations are usually generated
/// with the [`targets!`](crate::targets) macro.
pub trait Target: Debug + Clone + PartialEq + Eq + Hash + Send + Sync + 'static {
    type Kind: Kind;

    fn kind(&self) -> Self::Kind;

    /// Identity of the object within its kind.
    fn object_id(&self) -> i64;

    fn from_object_id(kind: Self::Kind, object_id: i64) -> Option<Self>;

    fn entity_type(&self) -> EntityType {
        self.kind().entity_type()
    }
}

/// Values usable as the payload of a [`Target`] variant.
pub trait ObjectId: Sized {
    fn to_raw(&self) -> i64;

    fn from_raw(raw: i64) -> Option<Self>;
}

impl ObjectId for i64 {
    fn to_raw(&self) -> i64 {
        *self
    }

    fn from_raw(raw: i64) -> Option<Self> {
        Some(raw)
    }
}

impl<T: Marker> ObjectId for Id<T> {
    fn to_raw(&self) -> i64 {
        self.as_i64()
    }

    fn from_raw(raw: i64) -> Option<Self> {
        Id::from_i64(raw)
    }
}

/// Declares a followable target enum together with its kind enum.
///
/// ```rust
/// use follow::types::id::{marker::UserMarker, Id};
///
/// follow::targets! {
///     pub enum Followable: FollowableKind {
///         Post(i64),
///         Topic(i64),
///         Member(Id<UserMarker>),
///     }
/// }
///
/// use follow::Target;
/// assert_eq!(FollowableKind::Post, Followable::Post(1).kind());
/// assert_eq!("Topic", Followable::Topic(2).entity_type().name());
/// ```
#[macro_export]
macro_rules! targets {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $kind:ident {
            $( $variant:ident ( $ty:ty ) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $variant($ty), )+
        }

        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $kind {
            $( $variant, )+
        }

        impl $crate::Kind for $kind {
            fn entity_type(self) -> $crate::EntityType {
                match self {
                    $( Self::$variant => $crate::EntityType::new(stringify!($variant)), )+
                }
            }

            fn from_entity_type(entity_type: $crate::EntityType) -> ::std::option::Option<Self> {
                $(
                    if entity_type.name() == stringify!($variant) {
                        return ::std::option::Option::Some(Self::$variant);
                    }
                )+
                ::std::option::Option::None
            }
        }

        impl ::std::convert::From<$kind> for $crate::EntityType {
            fn from(kind: $kind) -> Self {
                $crate::Kind::entity_type(kind)
            }
        }

        impl<'a> ::std::convert::From<$kind> for $crate::Lookup<'a, $name> {
            fn from(kind: $kind) -> Self {
                $crate::Lookup::Kind($crate::Kind::entity_type(kind))
            }
        }

        impl $crate::Target for $name {
            type Kind = $kind;

            fn kind(&self) -> $kind {
                match self {
                    $( Self::$variant(..) => $kind::$variant, )+
                }
            }

            fn object_id(&self) -> i64 {
                match self {
                    $( Self::$variant(id) => $crate::ObjectId::to_raw(id), )+
                }
            }

            fn from_object_id(kind: $kind, object_id: i64) -> ::std::option::Option<Self> {
                match kind {
                    $( $kind::$variant => <$ty as $crate::ObjectId>::from_raw(object_id).map(Self::$variant), )+
                }
            }
        }
    };
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Followable, FollowableKind};
    use crate::types::id::marker::UserMarker;

    #[test]
    fn kinds_map_to_their_variant_names() {
        assert_eq!("Post", FollowableKind::Post.entity_type().name());
        assert_eq!(
            Some(FollowableKind::Topic),
            FollowableKind::from_entity_type(EntityType::new("Topic"))
        );
        assert_eq!(None, FollowableKind::from_entity_type(EntityType::new("Comment")));
    }

    #[test]
    fn targets_rebuild_from_their_parts() {
        let member = Followable::Member(Id::<UserMarker>::new(9));
        assert_eq!(FollowableKind::Member, member.kind());
        assert_eq!(9, member.object_id());
        assert_eq!(
            Some(member),
            Followable::from_object_id(FollowableKind::Member, 9)
        );

        // user ids can never be zero or negative
        assert_eq!(None, Followable::from_object_id(FollowableKind::Member, 0));
        assert_eq!(
            Some(Followable::Post(-3)),
            Followable::from_object_id(FollowableKind::Post, -3)
        );
    }
}
