use std::sync::Arc;

use estuary_core::{CompositeDisposable, Disposable, Event, Observer, Scheduler, SerialDisposable};
use parking_lot::Mutex;

use crate::signal::Signal;

impl<T: Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Runs the producer's subscription work on `scheduler` instead of the
	/// caller's thread; disposing the outer handle before the scheduled
	/// subscription has actually started cancels it instead of letting it
	/// run.
	pub fn subscribe_on(&self, scheduler: Arc<dyn Scheduler>) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let inner = SerialDisposable::create();
			scheduler.schedule(Box::new({
				let upstream = upstream.clone();
				let inner = inner.clone();
				move || {
					let sub = upstream.observe(move |event: Event<T, E>| observer.on_event(event));
					inner.set(sub);
				}
			}));
			Disposable::from_arc(inner)
		})
	}

	/// Re-delivers every event to the downstream observer via `scheduler`
	/// instead of whatever thread upstream happened to call from.
	pub fn receive_on(&self, scheduler: Arc<dyn Scheduler>) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			upstream.observe(move |event: Event<T, E>| {
				let observer = observer.clone();
				scheduler.schedule(Box::new(move || observer.on_event(event)));
			})
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests_support::ManualScheduler;
	use estuary_core::Never;

	#[test]
	fn subscribe_on_runs_the_subscribe_call_through_the_scheduler() {
		let scheduler = ManualScheduler::new();
		let subscribed = Arc::new(Mutex::new(false));
		let flag = subscribed.clone();
		let source = Signal::<i32, Never>::from_producer(move |observer| {
			*flag.lock() = true;
			observer.on_event(Event::Next(1));
			observer.on_event(Event::Completed);
			Disposable::noop()
		});
		let deferred = source.subscribe_on(scheduler.clone());
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _sub = deferred.observe(move |e: Event<i32, Never>| r.lock().push(e));
		assert!(*subscribed.lock());
		assert_eq!(*recorded.lock(), vec![Event::Next(1), Event::Completed]);
	}

	#[test]
	fn receive_on_still_delivers_every_event() {
		let scheduler = ManualScheduler::new();
		let source = Signal::<i32, Never>::sequence(vec![1, 2, 3]).receive_on(scheduler.clone());
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _sub = source.observe_next(move |v| r.lock().push(v));
		assert_eq!(*recorded.lock(), vec![1, 2, 3]);
	}
}
