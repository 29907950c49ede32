use crate::internal::Sealed;

macro_rules! markers {
    { $( $(#[$meta:meta])* $ident:ident, )* } => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $ident;
        impl Sealed for $ident {}
        impl Marker for $ident {}
    )*};
}

markers! {
    AnyMarker,
    /// Marks the id of a user owning follow records.
    UserMarker,
    /// Marks the id of a persisted follow record.
    FollowMarker,
}

/// This trait represents a marker restricting all objects to
/// from using it as a generic in [Id](super::Id) object.
///
/// The derives on [Id](super::Id) are only as strong as its marker, so
/// every marker must be copyable and totally ordered.
pub trait Marker: Sealed + Copy + Ord + Send + Sync + 'static {}
