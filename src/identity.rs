use crate::types::id::{marker::UserMarker, Id};

/// Anything that can stand in for the caller of a follow operation.
///
/// The identity subsystem is external to this crate; implement this
/// trait on whatever session or principal type it hands out.
pub trait Identity {
    /// The user owning follow records made by this caller, if any.
    fn user_id(&self) -> Option<Id<UserMarker>>;

    fn is_anonymous(&self) -> bool {
        self.user_id().is_none()
    }
}

/// Ready-made [`Identity`] for callers that may not be logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viewer {
    Anonymous,
    User(Id<UserMarker>),
}

impl Identity for Viewer {
    fn user_id(&self) -> Option<Id<UserMarker>> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(*id),
        }
    }
}

impl Identity for Id<UserMarker> {
    fn user_id(&self) -> Option<Id<UserMarker>> {
        Some(*self)
    }
}

impl<I: Identity> Identity for Option<I> {
    fn user_id(&self) -> Option<Id<UserMarker>> {
        self.as_ref().and_then(Identity::user_id)
    }

    fn is_anonymous(&self) -> bool {
        self.as_ref().map_or(true, Identity::is_anonymous)
    }
}

impl<I: Identity + ?Sized> Identity for &I {
    fn user_id(&self) -> Option<Id<UserMarker>> {
        (**self).user_id()
    }

    fn is_anonymous(&self) -> bool {
        (**self).is_anonymous()
    }
}

impl From<Id<UserMarker>> for Viewer {
    fn from(id: Id<UserMarker>) -> Self {
        Self::User(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_callers_have_no_user() {
        assert!(Viewer::Anonymous.is_anonymous());
        assert_eq!(None, Viewer::Anonymous.user_id());
        assert!(None::<Viewer>.is_anonymous());
        assert!(Some(Viewer::Anonymous).is_anonymous());
    }

    #[test]
    fn logged_in_callers_resolve_to_their_id() {
        let id = Id::<UserMarker>::new(7);
        assert!(!Viewer::from(id).is_anonymous());
        assert_eq!(Some(id), Viewer::User(id).user_id());
        assert_eq!(Some(id), Some(id).user_id());
        assert_eq!(Some(id), (&id).user_id());
    }
}
