use serde::Deserialize;
use std::num::NonZeroUsize;

/// Tuning of the [follow store](crate::FollowStore).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Follows {
    /// Makes `get_or_create` take a per-(user, target) lock so that
    /// concurrent callers within this process never insert twice.
    ///
    /// **Environment variables**:
    /// - `FOLLOW_SERIALIZE_GET_OR_CREATE`
    pub serialize_get_or_create: bool,
    /// Amount of lock stripes shared by all (user, target) pairs.
    ///
    /// **Environment variables**:
    /// - `FOLLOW_LOCK_STRIPES`
    pub lock_stripes: NonZeroUsize,
}

impl Follows {
    const DEFAULT_LOCK_STRIPES: usize = 64;
}

impl Default for Follows {
    fn default() -> Self {
        Self {
            serialize_get_or_create: false,
            lock_stripes: match NonZeroUsize::new(Self::DEFAULT_LOCK_STRIPES) {
                Some(n) => n,
                None => panic!("DEFAULT_LOCK_STRIPES is accidentally set to 0"),
            },
        }
    }
}
