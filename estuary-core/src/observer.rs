use std::sync::Arc;

use parking_lot::ReentrantMutex;
use std::cell::Cell;

use crate::disposable::{Cancellable, CompositeDisposable, Disposable};
use crate::event::Event;

/// A sink that accepts a signal's events.
///
/// Blanket-implemented for any `Fn(Event<T, E>) + Send + Sync`, so most call
/// sites pass a plain closure rather than naming this trait.
pub trait Observer<T, E>: Send + Sync {
	fn on_event(&self, event: Event<T, E>);
}

impl<T, E, F> Observer<T, E> for F
where
	F: Fn(Event<T, E>) + Send + Sync,
{
	fn on_event(&self, event: Event<T, E>) {
		self(event)
	}
}

/// Wraps a user observer with the invariants every subscription must
/// uphold:
///
/// 1. single termination: the first terminal event closes the observer;
/// 2. post-disposal silence: a disposed subscription forwards nothing;
/// 3. auto-dispose on terminal: a terminal event disposes the whole
///    subscription after being forwarded, releasing producer-owned state;
/// 4. thread safety: all of the above is serialised under a
///    subscription-owned reentrant lock, so a producer emitting on one
///    thread can never interleave with a timer emitting on another.
pub struct GuardedObserver<T, E> {
	inner: Arc<dyn Observer<T, E>>,
	lock: ReentrantMutex<Cell<bool>>,
	subscription: Arc<CompositeDisposable>,
}

impl<T, E> GuardedObserver<T, E> {
	pub fn new(inner: Arc<dyn Observer<T, E>>) -> (Arc<Self>, Disposable) {
		let subscription = CompositeDisposable::create();
		let guarded = Arc::new(Self {
			inner,
			lock: ReentrantMutex::new(Cell::new(false)),
			subscription: subscription.clone(),
		});
		(guarded, Disposable::from_arc(subscription))
	}

	/// The disposable that, when disposed, silences this observer and tears
	/// down whatever has been registered with it via
	/// [`add_child`](GuardedObserver::add_child).
	pub fn disposable(&self) -> Disposable {
		Disposable::from_arc(self.subscription.clone())
	}

	/// Registers `d` with this subscription: disposed together with it,
	/// immediately if the subscription has already terminated or been
	/// disposed. `Signal::observe` uses this to attach the producer's own
	/// teardown disposable once the producer closure returns it.
	pub fn add_child(&self, d: Disposable) {
		self.subscription.add(d);
	}

	pub fn forward(&self, event: Event<T, E>) {
		let guard = self.lock.lock();
		if self.subscription.is_disposed() || guard.get() {
			// Already terminated or disposed: drop the event silently.
			return;
		}
		let terminal = event.is_terminal();
		if terminal {
			guard.set(true);
		}
		self.inner.on_event(event);
		if terminal {
			// Releases producer-owned state (timers, inner subscriptions, bus
			// registrations) on natural completion, not just on an explicit
			// outer dispose() call.
			self.subscription.dispose();
		}
	}
}

impl<T, E> Observer<T, E> for GuardedObserver<T, E> {
	fn on_event(&self, event: Event<T, E>) {
		self.forward(event);
	}
}
