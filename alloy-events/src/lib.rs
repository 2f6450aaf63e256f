//! Typed publish/subscribe event bus (component C4).
//!
//! Events are modelled as a tagged family rather than a deep type hierarchy:
//! each concrete event reports a dot-separated tag path (e.g.
//! `"player.join"`), and a subscription registered against an
//! ancestor tag (e.g. `"player"`) is invoked for every event whose tag has
//! that ancestor as a dot-delimited prefix. That is how "supertype" dispatch
//! is implemented without runtime inheritance.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

/// A value fired through the bus. Concrete events are `'static` so they can
/// be downcast back from `&mut dyn Event` inside handlers.
pub trait Event: Any + Send {
    /// Dot-separated tag path identifying this event's place in the family,
    /// most specific component last (e.g. `"block.break"`).
    fn tag(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `Some(self)` for events that carry a cancellation flag. Non-cancellable
    /// events use the default `None` and ignore cancellation semantics
    /// entirely.
    fn as_cancellable_mut(&mut self) -> Option<&mut dyn Cancellable> {
        None
    }
}

/// Implemented by cancellable events alongside [`Event`].
pub trait Cancellable {
    fn cancelled(&self) -> bool;
    fn set_cancelled(&mut self, cancelled: bool);
}

/// Boilerplate for the `as_any`/`as_any_mut` pair every concrete event needs.
#[macro_export]
macro_rules! impl_event_any {
    () => {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

/// Handler invocation order, `Monitor` last and observation-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Monitor,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

pub type Handler = Arc<dyn Fn(&mut dyn Event) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    handler: Handler,
    priority: Priority,
    ignore_cancelled: bool,
    owner: String,
    sequence: u64,
}

/// A typed pub/sub registry with priority ordering, cancellation
/// propagation, and handler-exception isolation.
pub struct EventBus {
    subscribers: RwLock<HashMap<&'static str, Vec<Subscription>>>,
    sequence: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Register `handler` for `event_tag` (an exact tag or an ancestor
    /// prefix). Re-registering the same `(event_tag, handler)` pair is a
    /// no-op.
    pub fn register(
        &self,
        event_tag: &'static str,
        handler: Handler,
        priority: Priority,
        ignore_cancelled: bool,
        owner: impl Into<String>,
    ) {
        let mut subscribers = self.subscribers.write();
        let bucket = subscribers.entry(event_tag).or_default();
        if bucket.iter().any(|sub| Arc::ptr_eq(&sub.handler, &handler)) {
            return;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        bucket.push(Subscription {
            handler,
            priority,
            ignore_cancelled,
            owner: owner.into(),
            sequence,
        });
    }

    /// Remove a prior registration; a no-op if it was never registered.
    pub fn unregister(&self, event_tag: &str, handler: &Handler) {
        let mut subscribers = self.subscribers.write();
        if let Some(bucket) = subscribers.get_mut(event_tag) {
            bucket.retain(|sub| !Arc::ptr_eq(&sub.handler, handler));
        }
    }

    /// Remove every subscription registered by `owner`, across every tag.
    pub fn unregister_all(&self, owner: &str) {
        let mut subscribers = self.subscribers.write();
        for bucket in subscribers.values_mut() {
            bucket.retain(|sub| sub.owner != owner);
        }
    }

    /// Synchronously dispatch `event` to every matching subscriber in
    /// priority order, then return it. Never panics: a handler panic is
    /// captured, logged, and dispatch continues with the next handler.
    ///
    /// The subscriber list is snapshotted under the read lock and the lock
    /// released before any handler runs, so a handler may itself call
    /// `fire`, `register`, or `unregister` without deadlocking; such changes
    /// only affect subsequent `fire` calls, never the dispatch already in
    /// flight.
    pub fn fire<E: Event>(&self, mut event: E) -> E {
        let tag = event.tag();
        let mut matching: Vec<Subscription> = {
            let subscribers = self.subscribers.read();
            subscribers
                .iter()
                .filter(|(registered_tag, _)| tag_matches(tag, registered_tag))
                .flat_map(|(_, bucket)| bucket.iter().cloned())
                .collect()
        };
        matching.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.sequence.cmp(&b.sequence)));

        for subscription in matching {
            let is_cancelled = event
                .as_cancellable_mut()
                .map(|cancellable| cancellable.cancelled())
                .unwrap_or(false);
            if is_cancelled && subscription.ignore_cancelled {
                continue;
            }

            let pre_dispatch_cancelled = event.as_cancellable_mut().map(|c| c.cancelled());

            let handler = subscription.handler.clone();
            let dispatch = panic::catch_unwind(AssertUnwindSafe(|| {
                handler(&mut event as &mut dyn Event)
            }));
            if let Err(payload) = dispatch {
                error!(
                    owner = %subscription.owner,
                    event = tag,
                    "event handler panicked: {}",
                    panic_message(payload.as_ref())
                );
            }

            if subscription.priority == Priority::Monitor {
                if let (Some(cancellable), Some(pre)) =
                    (event.as_cancellable_mut(), pre_dispatch_cancelled)
                {
                    // MONITOR handlers are observation-only: any attempted
                    // mutation of `cancelled` is discarded.
                    cancellable.set_cancelled(pre);
                }
            }
        }

        event
    }
}

fn tag_matches(fired_tag: &str, registered_tag: &str) -> bool {
    fired_tag == registered_tag
        || fired_tag
            .strip_prefix(registered_tag)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
