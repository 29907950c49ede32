//! A generic "follow" relation: users follow heterogeneous targets
//! (posts, topics, other users...) through a single record type.
//!
//! Declare what can be followed with [`targets!`], register every
//! kind in a [`TargetRegistry`] at startup, then create and query
//! follow records through a [`FollowStore`] backed by any
//! [`Datastore`].
//!
//! ```rust
//! use follow::{datastore::MemoryStore, FollowStore, TargetRegistry, Viewer};
//! use follow::types::Id;
//! use std::sync::Arc;
//!
//! follow::targets! {
//!     pub enum Followable: FollowableKind {
//!         Post(i64),
//!         Topic(i64),
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut registry = TargetRegistry::builder();
//! registry.register(FollowableKind::Post).unwrap();
//! registry.register(FollowableKind::Topic).unwrap();
//! let registry = Arc::new(registry.build());
//!
//! let store = FollowStore::new(registry.clone(), MemoryStore::new(&registry));
//! let alice = Viewer::User(Id::new(1));
//!
//! store.create(&alice, &Followable::Post(1)).await.unwrap();
//! assert!(store.is_following(&alice, &Followable::Post(1)).await.unwrap());
//! assert!(!store.is_following(&Viewer::Anonymous, &Followable::Post(1)).await.unwrap());
//! assert_eq!(1, store.get_follows(FollowableKind::Post).await.unwrap().len());
//! # });
//! ```
pub mod config;
pub mod datastore;
pub mod error;
pub mod events;
pub mod identity;
pub mod logging;
pub mod record;
pub mod registry;
pub mod store;
pub mod target;
pub mod types;

pub(crate) mod internal;
pub(crate) mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use self::datastore::Datastore;
pub use self::error::{Error, ErrorExt, Result};
pub use self::events::{EventBus, FollowEvent, Listener, ListenerError, SubscriptionId};
pub use self::identity::{Identity, Viewer};
pub use self::record::{FollowRecord, NewFollow};
pub use self::registry::{RegistryBuilder, RegistryError, Slot, TargetRegistry};
pub use self::store::{FollowStore, Lookup};
pub use self::target::{EntityType, Kind, ObjectId, Target};
