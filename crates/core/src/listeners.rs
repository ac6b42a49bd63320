//! Lifecycle listener registry.
//!
//! Platforms receive tab lifecycle events from one global source and fan them
//! out to per-context listeners stored in a [`ListenerMap`]. Each listener is
//! owned by a [`Subscription`] that removes it exactly once, either when
//! [`Subscription::unsubscribe`] is called or when it is dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::channel::mpsc;
use indexmap::IndexMap;
use tabrun_protocol::ContextId;

use crate::platform::{LifecycleEvent, LifecycleSubscription};

/// Unique identifier for lifecycle listeners.
pub type ListenerId = u64;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique listener ID.
pub fn next_listener_id() -> ListenerId {
	NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

struct ListenerEntry {
	context: ContextId,
	tx: mpsc::UnboundedSender<LifecycleEvent>,
}

/// Listener storage keyed by [`ListenerId`], in registration order.
#[derive(Clone, Default)]
pub struct ListenerMap {
	inner: Rc<RefCell<IndexMap<ListenerId, ListenerEntry>>>,
}

impl ListenerMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a listener for `context` and returns its event stream.
	pub fn subscribe(&self, context: ContextId) -> LifecycleSubscription {
		let id = next_listener_id();
		let (tx, rx) = mpsc::unbounded();
		self.inner.borrow_mut().insert(id, ListenerEntry { context, tx });
		tracing::trace!(%context, listener = id, "lifecycle listener attached");
		LifecycleSubscription::new(context, rx, Subscription::from_listener_map(id, self))
	}

	/// Delivers `event` to every listener registered for its context.
	///
	/// Returns the number of listeners the event reached.
	pub fn dispatch(&self, event: LifecycleEvent) -> usize {
		let targets: Vec<_> = {
			let map = self.inner.borrow();
			map.values()
				.filter(|entry| entry.context == event.context_id)
				.map(|entry| entry.tx.clone())
				.collect()
		};

		targets.into_iter().filter(|tx| tx.unbounded_send(event).is_ok()).count()
	}

	/// Number of attached listeners across all contexts.
	pub fn len(&self) -> usize {
		self.inner.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.borrow().is_empty()
	}

	/// Number of attached listeners for one context.
	pub fn listeners_for(&self, context: ContextId) -> usize {
		self.inner.borrow().values().filter(|entry| entry.context == context).count()
	}

	fn remove(&self, id: ListenerId) -> bool {
		self.inner.borrow_mut().shift_remove(&id).is_some()
	}
}

impl fmt::Debug for ListenerMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ListenerMap").field("listeners", &self.len()).finish()
	}
}

/// RAII handle that detaches a lifecycle listener on drop.
///
/// Holds a weak reference to the listener map, so dropping after the owning
/// platform is gone is a no-op.
pub struct Subscription {
	id: ListenerId,
	dropper: Option<Rc<dyn Fn(ListenerId)>>,
}

impl Subscription {
	/// Creates a subscription with a custom dropper function.
	pub fn new(id: ListenerId, dropper: Rc<dyn Fn(ListenerId)>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	/// Creates a subscription from a listener map using a weak reference.
	pub fn from_listener_map(id: ListenerId, listeners: &ListenerMap) -> Self {
		let weak: Weak<RefCell<IndexMap<ListenerId, ListenerEntry>>> = Rc::downgrade(&listeners.inner);
		let dropper = Rc::new(move |id: ListenerId| {
			if let Some(inner) = weak.upgrade() {
				if (ListenerMap { inner }).remove(id) {
					tracing::trace!(listener = id, "lifecycle listener detached");
				}
			}
		});
		Self::new(id, dropper)
	}

	/// Returns this subscription's listener ID.
	pub fn id(&self) -> ListenerId {
		self.id
	}

	/// Returns true until the listener has been detached.
	pub fn is_active(&self) -> bool {
		self.dropper.is_some()
	}

	/// Explicitly detaches. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		self.detach();
	}

	pub(crate) fn detach(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.detach();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use futures::StreamExt;

	use super::*;
	use crate::platform::{ContextChange, LoadState};

	fn complete(id: i32) -> LifecycleEvent {
		LifecycleEvent::new(ContextId::new(id), ContextChange::State(LoadState::Complete))
	}

	#[test]
	fn test_listener_id_increments() {
		let id1 = next_listener_id();
		let id2 = next_listener_id();
		assert!(id2 > id1);
	}

	#[test]
	fn test_subscription_unsubscribe_runs_dropper_once() {
		let calls = Rc::new(Cell::new(0));
		let calls_clone = Rc::clone(&calls);
		let dropper = Rc::new(move |_id: ListenerId| calls_clone.set(calls_clone.get() + 1));

		let sub = Subscription::new(1, dropper);
		assert_eq!(calls.get(), 0);

		sub.unsubscribe();
		assert_eq!(calls.get(), 1);
	}

	#[test]
	fn test_subscription_drop() {
		let calls = Rc::new(Cell::new(0));
		let calls_clone = Rc::clone(&calls);
		let dropper = Rc::new(move |_id: ListenerId| calls_clone.set(calls_clone.get() + 1));

		{
			let _sub = Subscription::new(1, dropper);
		}
		assert_eq!(calls.get(), 1);
	}

	#[test]
	fn test_dispatch_is_scoped_to_context() {
		let map = ListenerMap::new();
		let mut a = map.subscribe(ContextId::new(1));
		let _b = map.subscribe(ContextId::new(2));

		assert_eq!(map.dispatch(complete(1)), 1);
		assert_eq!(map.dispatch(complete(3)), 0);

		let event = futures::executor::block_on(a.next()).unwrap();
		assert_eq!(event.context_id, ContextId::new(1));
	}

	#[test]
	fn test_dispatch_reaches_every_listener_of_a_context() {
		let map = ListenerMap::new();
		let mut first = map.subscribe(ContextId::new(4));
		let mut second = map.subscribe(ContextId::new(4));

		assert_eq!(map.dispatch(complete(4)), 2);

		for sub in [&mut first, &mut second] {
			let event = futures::executor::block_on(sub.next()).unwrap();
			assert_eq!(event, complete(4));
		}
	}

	#[test]
	fn test_dropping_subscription_detaches_listener() {
		let map = ListenerMap::new();
		let sub = map.subscribe(ContextId::new(5));
		assert_eq!(map.listeners_for(ContextId::new(5)), 1);

		drop(sub);
		assert!(map.is_empty());
		assert_eq!(map.dispatch(complete(5)), 0);
	}

	#[test]
	fn test_subscription_outliving_map_is_harmless() {
		let map = ListenerMap::new();
		let sub = map.subscribe(ContextId::new(9));
		drop(map);
		drop(sub);
	}
}
