use std::cell::Cell;
use std::time::Duration;

use crate::disposable::Disposable;

/// Abstract execution context a signal can submit work to.
///
/// `estuary-core` defines no concrete scheduler: immediate, main-thread and
/// queued schedulers are platform glue that lives outside the core.
///
/// Implementors may run `schedule`'d thunks synchronously or
/// asynchronously; operators built against this trait must not assume
/// either, only that ordering within a single scheduler instance is FIFO
/// for equal deadlines (see `delay`).
pub trait Scheduler: Send + Sync {
	/// Submits `thunk` to run later, on this scheduler's own thread(s).
	fn schedule(&self, thunk: Box<dyn FnOnce() + Send>);

	/// Submits `thunk` to run no sooner than `delay` from now. Disposing the
	/// returned handle before the deadline prevents the invocation.
	fn schedule_after(&self, delay: Duration, thunk: Box<dyn FnOnce() + Send>) -> Disposable;
}

impl<S: Scheduler + ?Sized> Scheduler for std::sync::Arc<S> {
	fn schedule(&self, thunk: Box<dyn FnOnce() + Send>) {
		(**self).schedule(thunk)
	}

	fn schedule_after(&self, delay: Duration, thunk: Box<dyn FnOnce() + Send>) -> Disposable {
		(**self).schedule_after(delay, thunk)
	}
}

thread_local! {
	static REENTRANT_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Wraps any [`Scheduler`] so that thunks submitted while already executing
/// a thunk on the current thread are silently dropped instead of run.
///
/// The canonical way to break a binding cycle: an update propagating from
/// `a` into `b` must not be allowed to re-enter `a` synchronously.
pub struct NonRecursiveScheduler<S> {
	inner: S,
}

impl<S: Scheduler> NonRecursiveScheduler<S> {
	pub fn new(inner: S) -> Self {
		Self { inner }
	}

	/// Runs `f` directly if the current thread is not already inside a
	/// guarded frame on this scheduler, otherwise drops it.
	///
	/// Used by `schedule`-like call sites that want immediate, same-thread
	/// execution guarded against re-entry (e.g. two-way binding).
	pub fn run_guarded(&self, f: impl FnOnce()) {
		let entered = REENTRANT_DEPTH.with(|depth| {
			if depth.get() > 0 {
				false
			} else {
				depth.set(depth.get() + 1);
				true
			}
		});
		if !entered {
			return;
		}
		let _guard = scopeguard::guard((), |_| {
			REENTRANT_DEPTH.with(|depth| depth.set(depth.get() - 1));
		});
		f();
	}
}

impl<S: Scheduler> Scheduler for NonRecursiveScheduler<S> {
	fn schedule(&self, thunk: Box<dyn FnOnce() + Send>) {
		self.inner.schedule(Box::new(move || {
			// Thunks dispatched through the inner scheduler run on whatever
			// thread that scheduler chooses; re-entry is only meaningful
			// for same-thread recursive calls, so no guard is needed here.
			thunk();
		}));
	}

	fn schedule_after(&self, delay: Duration, thunk: Box<dyn FnOnce() + Send>) -> Disposable {
		self.inner.schedule_after(delay, thunk)
	}
}
