use once_cell::sync::Lazy;
use serde::de::{Error as DeError, Unexpected};
use std::{
    fmt::{Debug, Display},
    hash::Hash,
    marker::PhantomData,
    num::NonZeroU64,
};
use thiserror::Error;

use self::marker::Marker;

pub mod marker;

/// Largest value an [`Id`] may hold. Ids are stored as Postgres
/// `BIGINT` so anything above [`i64::MAX`] cannot be represented.
const MAX_ID: u64 = i64::MAX as u64;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id<T: Marker> {
    value: NonZeroU64,
    phantom: PhantomData<T>,
}

impl<T: Marker> Id<T> {
    /// # Panics
    ///
    /// It will panic if the value is 0 or greater than [`i64::MAX`].
    #[must_use]
    #[track_caller]
    pub const fn new(n: u64) -> Self {
        if let Some(id) = Self::new_checked(n) {
            id
        } else {
            panic!("value is zero or out of range")
        }
    }

    #[must_use]
    pub const fn new_checked(n: u64) -> Option<Self> {
        if n > MAX_ID {
            return None;
        }
        if let Some(n) = NonZeroU64::new(n) {
            Some(Self {
                value: n,
                phantom: PhantomData,
            })
        } else {
            None
        }
    }

    /// Converts a signed database value into an id. Non-positive
    /// values are rejected.
    #[must_use]
    pub fn from_i64(n: i64) -> Option<Self> {
        u64::try_from(n).ok().and_then(Self::new_checked)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.value.get()
    }

    // already checked in the constructors
    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.value.get() as i64
    }

    #[must_use]
    pub const fn cast<M: Marker>(self) -> Id<M> {
        Id {
            value: self.value,
            phantom: PhantomData,
        }
    }
}

impl<T: Marker> Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use heck::ToSnakeCase;
        static MARKER_MODULE: Lazy<String> = Lazy::new(|| {
            format!(
                "{}::types::id::marker::",
                env!("CARGO_PKG_NAME").to_snake_case()
            )
        });

        // All of our own markers live in the `marker` module
        let type_name = std::any::type_name::<T>();
        let type_name = if type_name.starts_with(&*MARKER_MODULE) {
            type_name.split("::").last().unwrap_or(type_name)
        } else {
            type_name
        };
        write!(f, "Id::<{type_name}>({})", self.value.get())
    }
}

impl<T: Marker> Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.value.get(), f)
    }
}

impl<T: Marker> Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.value.get());
    }
}

impl<'de, T: Marker> serde::Deserialize<'de> for Id<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor<T: Marker>(PhantomData<T>);

        impl<'de, T: Marker> serde::de::Visitor<'de> for Visitor<T> {
            type Value = Id<T>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a positive 63-bit id")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: DeError,
            {
                Id::from_i64(v).ok_or_else(|| {
                    DeError::invalid_value(Unexpected::Signed(v), &"positive 63-bit integer")
                })
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: DeError,
            {
                Id::new_checked(v).ok_or_else(|| {
                    DeError::invalid_value(Unexpected::Unsigned(v), &"positive 63-bit integer")
                })
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: DeError,
            {
                let value = v.parse().map_err(|_| {
                    DeError::invalid_value(Unexpected::Str(v), &"positive 63-bit integer string")
                })?;

                self.visit_u64(value)
            }
        }

        deserializer.deserialize_any(Visitor(PhantomData))
    }
}

impl<T: Marker> serde::Serialize for Id<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.value.get())
    }
}

impl<'q, T: Marker> sqlx::Encode<'q, sqlx::Postgres> for Id<T> {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Postgres as sqlx::database::HasArguments<'q>>::ArgumentBuffer,
    ) -> sqlx::encode::IsNull {
        <i64 as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_i64(), buf)
    }
}

impl<'r, T: Marker> sqlx::Decode<'r, sqlx::Postgres> for Id<T> {
    fn decode(
        value: <sqlx::Postgres as sqlx::database::HasValueRef<'r>>::ValueRef,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        #[derive(Debug, Error)]
        #[error("all IDs must be positive")]
        struct NonPositiveIdError;

        let value = <i64 as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
        Id::from_i64(value).ok_or_else(|| Box::new(NonPositiveIdError) as sqlx::error::BoxDynError)
    }
}

impl<T: Marker> sqlx::Type<sqlx::Postgres> for Id<T> {
    fn type_info() -> <sqlx::Postgres as sqlx::Database>::TypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::id::marker::{AnyMarker, FollowMarker, UserMarker};
    use serde_test::Token;
    use static_assertions::{assert_eq_size, assert_impl_all};

    assert_eq_size!(Id<AnyMarker>, u64);
    assert_eq_size!(Option<Id<AnyMarker>>, u64);
    assert_impl_all!(Id<AnyMarker>:
        Debug, Display, Clone, Copy, Send, Sync, Hash, Ord, sqlx::Decode<'static, sqlx::Postgres>,
        sqlx::Encode<'static, sqlx::Postgres>, sqlx::Type<sqlx::Postgres>
    );

    #[test]
    #[should_panic]
    fn test_new_with_zero() {
        _ = Id::<AnyMarker>::new(0);
    }

    #[test]
    fn test_initializers() {
        assert!(Id::<AnyMarker>::new_checked(0).is_none());
        assert!(Id::<AnyMarker>::new_checked(u64::MAX).is_none());
        assert_eq!(Some(1), Id::<AnyMarker>::new_checked(1).map(Id::get));

        assert!(Id::<AnyMarker>::from_i64(-5).is_none());
        assert!(Id::<AnyMarker>::from_i64(0).is_none());
        assert_eq!(Some(i64::MAX), Id::<AnyMarker>::from_i64(i64::MAX).map(Id::as_i64));
    }

    #[test]
    fn test_ids_are_copy_and_ordered_behind_generics() {
        fn raw<M: Marker>(id: &Id<M>) -> i64 {
            crate::ObjectId::to_raw(id)
        }

        fn sorted<M: Marker>(mut ids: Vec<Id<M>>) -> Vec<u64> {
            ids.sort();
            ids.into_iter().map(Id::get).collect()
        }

        assert_eq!(7, raw(&Id::<UserMarker>::new(7)));
        assert_eq!(
            vec![1, 2, 3],
            sorted(vec![Id::<FollowMarker>::new(3), Id::new(1), Id::new(2)])
        );
    }

    #[test]
    fn test_cast_keeps_value() {
        let id = Id::<AnyMarker>::new(42).cast::<UserMarker>();
        assert_eq!(42, id.get());
    }

    #[test]
    fn test_fmt_display_impl() {
        assert_eq!("1234567890", Id::<AnyMarker>::new(1234567890).to_string());
    }

    #[test]
    fn test_fmt_debug_impl() {
        use heck::ToSnakeCase;

        assert_eq!(
            "Id::<UserMarker>(1234567890)",
            format!("{:?}", Id::<UserMarker>::new(1234567890))
        );

        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        struct DummyMarker;
        impl marker::Marker for DummyMarker {}
        impl crate::internal::Sealed for DummyMarker {}

        let expected = format!(
            "Id::<{}::types::id::tests::test_fmt_debug_impl::DummyMarker>(1234567890)",
            env!("CARGO_PKG_NAME").to_snake_case()
        );
        assert_eq!(expected, format!("{:?}", Id::<DummyMarker>::new(1234567890)));
    }

    #[test]
    fn test_serde_impl() {
        let id = Id::<AnyMarker>::new(1234567890);
        serde_test::assert_de_tokens(&id, &[Token::U64(1234567890)]);
        serde_test::assert_de_tokens(&id, &[Token::Str("1234567890")]);
        serde_test::assert_de_tokens(&id, &[Token::I64(1234567890)]);
        serde_test::assert_ser_tokens(&id, &[Token::Str("1234567890")]);

        serde_test::assert_de_tokens_error::<Id<AnyMarker>>(
            &[Token::I64(-1)],
            "invalid value: integer `-1`, expected positive 63-bit integer",
        );
    }
}
