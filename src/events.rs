use error_stack::Report;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::record::FollowRecord;
use crate::target::{EntityType, Target};
use crate::types::id::marker::UserMarker;
use crate::types::Id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowEvent<T: Target> {
    /// A follow record was newly inserted.
    Followed(FollowRecord<T>),
    /// A follow record was deleted.
    Unfollowed(FollowRecord<T>),
}

impl<T: Target> FollowEvent<T> {
    #[must_use]
    pub fn record(&self) -> &FollowRecord<T> {
        match self {
            Self::Followed(record) | Self::Unfollowed(record) => record,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.record().user_id
    }

    #[must_use]
    pub fn target(&self) -> Option<&T> {
        self.record().target()
    }

    /// Kind of the followed target, used to route the event to per-kind
    /// subscribers.
    #[must_use]
    pub fn entity_type(&self) -> Option<EntityType> {
        self.target().map(Target::entity_type)
    }
}

/// Returned by listeners that could not handle an event. It is only
/// ever logged.
#[derive(Debug, Error)]
#[error("Follow event listener failed")]
pub struct ListenerError;

pub trait Listener<T: Target>: Send + Sync {
    fn on_event(&self, event: &FollowEvent<T>) -> Result<(), Report<ListenerError>>;
}

impl<T, F> Listener<T> for F
where
    T: Target,
    F: Fn(&FollowEvent<T>) -> Result<(), Report<ListenerError>> + Send + Sync,
{
    fn on_event(&self, event: &FollowEvent<T>) -> Result<(), Report<ListenerError>> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription<T: Target> {
    id: SubscriptionId,
    kind: Option<EntityType>,
    listener: Arc<dyn Listener<T>>,
}

/// Synchronous, in-process publish/subscribe channel for follow events.
///
/// Listeners run on the publishing task, in subscription order. Their
/// failures and panics are logged and never reach the publisher.
pub struct EventBus<T: Target> {
    subscriptions: RwLock<Vec<Subscription<T>>>,
    last_id: AtomicU64,
}

impl<T: Target> EventBus<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Subscribes to events of every kind.
    pub fn subscribe(&self, listener: impl Listener<T> + 'static) -> SubscriptionId {
        self.insert(None, Arc::new(listener))
    }

    /// Subscribes to events whose target is of the given kind.
    pub fn subscribe_kind(
        &self,
        kind: impl Into<EntityType>,
        listener: impl Listener<T> + 'static,
    ) -> SubscriptionId {
        self.insert(Some(kind.into()), Arc::new(listener))
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        before != subscriptions.len()
    }

    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers an event to every matching listener.
    #[tracing::instrument(skip_all, name = "follow.events.publish", fields(
        event = event_name(event),
        user_id = %event.user_id(),
    ))]
    pub fn publish(&self, event: &FollowEvent<T>) {
        let kind = event.entity_type();

        // Listeners may subscribe or unsubscribe from inside a callback.
        let listeners = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|subscription| subscription.kind.is_none() || subscription.kind == kind)
            .map(|subscription| (subscription.id, subscription.listener.clone()))
            .collect::<Vec<_>>();

        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(report)) => {
                    tracing::warn!(subscription = id.0, error = ?report, "follow event listener failed");
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(subscription = id.0, %message, "follow event listener panicked");
                }
            }
        }
    }

    fn insert(&self, kind: Option<EntityType>, listener: Arc<dyn Listener<T>>) -> SubscriptionId {
        let id = SubscriptionId(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, kind, listener });

        id
    }
}

impl<T: Target> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Target> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers())
            .finish()
    }
}

fn event_name<T: Target>(event: &FollowEvent<T>) -> &'static str {
    match event {
        FollowEvent::Followed(..) => "followed",
        FollowEvent::Unfollowed(..) => "unfollowed",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "<unknown>".into()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{self, Followable, FollowableKind};
    use std::sync::Mutex;

    fn followed(target: Followable) -> FollowEvent<Followable> {
        FollowEvent::Followed(test_utils::record(1, 1, target))
    }

    fn recorder(bus: &EventBus<Followable>, kind: Option<FollowableKind>) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = move |event: &FollowEvent<Followable>| -> Result<(), Report<ListenerError>> {
            sink.lock().unwrap().push(event.record().to_string());
            Ok(())
        };

        match kind {
            Some(kind) => bus.subscribe_kind(kind, listener),
            None => bus.subscribe(listener),
        };
        seen
    }

    #[test]
    fn routes_events_by_kind() {
        let bus = EventBus::new();
        let everything = recorder(&bus, None);
        let posts = recorder(&bus, Some(FollowableKind::Post));

        bus.publish(&followed(Followable::Post(1)));
        bus.publish(&followed(Followable::Topic(2)));

        assert_eq!(vec!["Post#1", "Topic#2"], *everything.lock().unwrap());
        assert_eq!(vec!["Post#1"], *posts.lock().unwrap());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let id = bus.subscribe(move |_: &FollowEvent<Followable>| -> Result<(), Report<ListenerError>> {
            *sink.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish(&followed(Followable::Post(1)));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&followed(Followable::Post(1)));

        assert_eq!(1, *seen.lock().unwrap());
        assert_eq!(0, bus.subscribers());
    }

    #[test]
    fn failing_listeners_do_not_stop_delivery() {
        let bus = EventBus::new();
        bus.subscribe(|_: &FollowEvent<Followable>| -> Result<(), Report<ListenerError>> {
            Err(Report::new(ListenerError))
        });
        bus.subscribe(|_: &FollowEvent<Followable>| -> Result<(), Report<ListenerError>> {
            panic!("listener exploded")
        });
        let seen = recorder(&bus, None);

        bus.publish(&followed(Followable::Topic(4)));
        assert_eq!(vec!["Topic#4"], *seen.lock().unwrap());
    }

    #[test]
    fn events_expose_their_record() {
        let event = FollowEvent::Unfollowed(test_utils::record(5, 2, Followable::Topic(3)));
        assert_eq!(2, event.user_id().get());
        assert_eq!(Some(&Followable::Topic(3)), event.target());
        assert_eq!(Some(FollowableKind::Topic.into()), event.entity_type());
        assert_eq!("unfollowed", event_name(&event));
    }
}
