use std::cell::RefCell;
use std::sync::Arc;

use estuary_core::{Disposable, Event, Never, Observer};
use parking_lot::ReentrantMutex;

use crate::signal::Signal;
use crate::subject::PassthroughSubject;

/// A mutable cell that is also a signal.
///
/// Subscribing delivers [`value`](Property::value) synchronously, then
/// every subsequent mutation. `Property` is infallible: its error type is
/// [`Never`], since a plain cell cannot itself fail; widen with
/// [`Signal::cast_error`] where a typed-error signal is required.
///
/// Guarded by a `ReentrantMutex`, the same way `Subject`'s registry is: a
/// subscriber's own callback may read or write the property it's observing
/// without deadlocking.
pub struct Property<T> {
	current: Arc<ReentrantMutex<RefCell<T>>>,
	bus: PassthroughSubject<T, Never>,
}

impl<T> Clone for Property<T> {
	fn clone(&self) -> Self {
		Self {
			current: self.current.clone(),
			bus: self.bus.clone(),
		}
	}
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
	pub fn new(initial: T) -> Self {
		Self {
			current: Arc::new(ReentrantMutex::new(RefCell::new(initial))),
			bus: PassthroughSubject::new(),
		}
	}

	/// The current value.
	pub fn value(&self) -> T {
		self.current.lock().borrow().clone()
	}

	/// Stores `v` and emits it to current subscribers.
	///
	/// The store and the emit happen under the same reentrant lock that
	/// [`as_signal`](Property::as_signal)'s subscribe path takes, so a
	/// subscriber that arrives concurrently either sees `v` as its initial
	/// value and does not also receive it as a live update, or sees the
	/// prior value as its initial and then `v` live, never both or
	/// neither. A subscriber re-entering `value()`/`set()` from its own
	/// callback reacquires the same lock rather than deadlocking.
	pub fn set(&self, v: T) {
		let guard = self.current.lock();
		*guard.borrow_mut() = v.clone();
		self.bus.send_next(v);
	}

	/// Stores `v` without emitting.
	pub fn silent_update(&self, v: T) {
		*self.current.lock().borrow_mut() = v;
	}

	/// Mutates the current value in place via `f`, then emits the result.
	pub fn update(&self, f: impl FnOnce(&mut T)) {
		let guard = self.current.lock();
		f(&mut *guard.borrow_mut());
		let next = guard.borrow().clone();
		self.bus.send_next(next);
	}

	/// Views this property as a [`Signal`] that replays the current value
	/// to every new subscriber, then forwards live mutations.
	pub fn as_signal(&self) -> Signal<T, Never> {
		let current = self.current.clone();
		let bus = self.bus.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, Never>>| {
			let guard = current.lock();
			observer.on_event(Event::Next(guard.borrow().clone()));
			// Held across the bus subscribe so a concurrent `set` cannot
			// land between the initial emit and registration.
			let disposable = bus.observe(move |event: Event<T, Never>| observer.on_event(event));
			drop(guard);
			disposable
		})
	}
}

impl<T: Clone + Send + Sync + 'static + Default> Default for Property<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;

	#[test]
	fn subscribing_delivers_current_value_first() {
		let prop = Property::new(0);
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _s = prop.as_signal().observe_next(move |v| r.lock().push(v));
		prop.set(5);
		prop.set(7);
		assert_eq!(*recorded.lock(), vec![0, 5, 7]);
	}

	#[test]
	fn silent_update_does_not_emit() {
		let prop = Property::new(0);
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _s = prop.as_signal().observe_next(move |v| r.lock().push(v));
		prop.silent_update(9);
		assert_eq!(*recorded.lock(), vec![0]);
		assert_eq!(prop.value(), 9);
	}

	#[test]
	fn late_subscriber_sees_latest_value() {
		let prop = Property::new(0);
		prop.set(1);
		prop.set(2);
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _s = prop.as_signal().observe_next(move |v| r.lock().push(v));
		assert_eq!(*recorded.lock(), vec![2]);
	}

	#[test]
	fn observer_can_read_the_property_it_is_observing_without_deadlock() {
		// A subscriber's own callback re-entering `value()`/`set()` on the
		// same property must reacquire the lock instead of deadlocking.
		let prop = Property::new(0);
		let seen_during_callback = Arc::new(Mutex::new(Vec::new()));
		let seen = seen_during_callback.clone();
		let observing_prop = prop.clone();
		let _s = prop.as_signal().observe_next(move |v| {
			seen.lock().push((v, observing_prop.value()));
		});
		prop.set(5);
		assert_eq!(*seen_during_callback.lock(), vec![(0, 0), (5, 5)]);
	}
}
