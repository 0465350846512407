//! One-way and two-way binding, under a non-recursive execution guard.

use std::sync::Arc;
use std::time::Duration;

use estuary_core::{
	CompositeDisposable, Disposable, DisposeBag, Event, Never, NonRecursiveScheduler, Scheduler,
};

use crate::property::Property;
use crate::signal::Signal;

/// Runs thunks immediately on the calling thread; [`NonRecursiveScheduler`]
/// is the part that actually matters here; this just gives it something to
/// wrap, since bindings need the reentrance guard but no real scheduling.
struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
	fn schedule(&self, thunk: Box<dyn FnOnce() + Send>) {
		thunk();
	}

	fn schedule_after(&self, _delay: Duration, thunk: Box<dyn FnOnce() + Send>) -> Disposable {
		thunk();
		Disposable::noop()
	}
}

/// The bind-target contract: something an infallible signal can be piped
/// into.
pub trait Bindable<T> {
	/// Subscribes `incoming` on a non-recursive execution context and
	/// retains the resulting disposable until the target itself is
	/// destroyed.
	fn bind(&self, incoming: Signal<T, Never>) -> Disposable;
}

impl<T: Clone + Send + Sync + 'static> Bindable<T> for Property<T> {
	fn bind(&self, incoming: Signal<T, Never>) -> Disposable {
		let guard = Arc::new(NonRecursiveScheduler::new(ImmediateScheduler));
		pipe_guarded(self.clone(), incoming, guard)
	}
}

fn pipe_guarded<T: Clone + Send + Sync + 'static>(
	target: Property<T>,
	incoming: Signal<T, Never>,
	guard: Arc<NonRecursiveScheduler<ImmediateScheduler>>,
) -> Disposable {
	incoming.observe(move |event: Event<T, Never>| {
		if let Event::Next(v) = event {
			let target = target.clone();
			guard.run_guarded(move || target.set(v));
		}
	})
}

impl<T: Clone + Send + Sync + 'static> Signal<T, Never> {
	/// Pipes `self` into `target`, filtered through `target`'s own
	/// non-recursive guard.
	pub fn bind_to<B: Bindable<T>>(&self, target: &B) -> Disposable {
		target.bind(self.clone())
	}

	/// [`bind_to`](Signal::bind_to), retaining the disposable in `bag`
	/// instead of returning it.
	pub fn bind_to_bag<B: Bindable<T>>(&self, target: &B, bag: &DisposeBag) {
		bag.insert(self.bind_to(target));
	}
}

/// Binds `a` and `b` to each other under one shared non-recursive guard: an
/// update propagating from `a` into `b` does not re-enter `a` synchronously,
/// and vice versa.
pub fn bidirectional_bind<T: Clone + Send + Sync + 'static>(
	a: &Property<T>,
	b: &Property<T>,
) -> Disposable {
	let guard = Arc::new(NonRecursiveScheduler::new(ImmediateScheduler));
	let a_to_b = pipe_guarded(b.clone(), a.as_signal(), guard.clone());
	let b_to_a = pipe_guarded(a.clone(), b.as_signal(), guard);
	let composite = CompositeDisposable::create();
	composite.add(a_to_b);
	composite.add(b_to_a);
	Disposable::from_arc(composite)
}

/// [`bidirectional_bind`], retaining the disposable in `bag`.
pub fn bidirectional_bind_bag<T: Clone + Send + Sync + 'static>(
	a: &Property<T>,
	b: &Property<T>,
	bag: &DisposeBag,
) {
	bag.insert(bidirectional_bind(a, b));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bind_to_seeds_the_target_and_then_tracks_updates() {
		let source = Property::new(1);
		let target = Property::new(0);
		let _d = source.as_signal().bind_to(&target);
		assert_eq!(target.value(), 1);
		source.set(2);
		assert_eq!(target.value(), 2);
	}

	#[test]
	fn bidirectional_bind_seeds_b_from_a_and_then_keeps_them_in_sync() {
		let a = Property::new("left".to_string());
		let b = Property::new("right".to_string());
		let _d = bidirectional_bind(&a, &b);
		assert_eq!(b.value(), "left");
		assert_eq!(a.value(), "left");

		a.set("updated-from-a".to_string());
		assert_eq!(b.value(), "updated-from-a");

		b.set("updated-from-b".to_string());
		assert_eq!(a.value(), "updated-from-b");
	}

	#[test]
	fn bidirectional_bind_does_not_recurse_forever() {
		let a = Property::new(0);
		let b = Property::new(0);
		let _d = bidirectional_bind(&a, &b);
		// If the guard failed to break the cycle this would overflow the
		// stack instead of returning.
		a.set(1);
		assert_eq!(a.value(), 1);
		assert_eq!(b.value(), 1);
	}

	#[test]
	fn bind_to_bag_disposes_when_the_bag_drops() {
		let source = Property::new(1);
		let target = Property::new(0);
		{
			let bag = DisposeBag::new();
			source.as_signal().bind_to_bag(&target, &bag);
			source.set(2);
			assert_eq!(target.value(), 2);
		}
		source.set(3);
		assert_eq!(target.value(), 2);
	}
}
