use std::sync::Arc;
use std::time::Duration;

use estuary_core::{
	Cancellable, CompositeDisposable, Disposable, Event, Observer, Scheduler, SerialDisposable,
};
use parking_lot::Mutex;

use crate::error::TimeoutError;
use crate::signal::Signal;

impl<T: Clone + Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Emits the last `next` value once `dt` has passed without another one
	/// arriving; a terminal flushes any pending value first.
	pub fn debounce(&self, dt: Duration, scheduler: Arc<dyn Scheduler>) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let pending: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
			let timer = SerialDisposable::create();
			let scheduler = scheduler.clone();
			let sub = {
				let pending = pending.clone();
				let timer = timer.clone();
				let observer = observer.clone();
				upstream.observe(move |event: Event<T, E>| match event {
					Event::Next(v) => {
						*pending.lock() = Some(v);
						let pending2 = pending.clone();
						let observer2 = observer.clone();
						let handle = scheduler.schedule_after(
							dt,
							Box::new(move || {
								if let Some(v) = pending2.lock().take() {
									observer2.on_event(Event::Next(v));
								}
							}),
						);
						timer.set(handle);
					}
					Event::Completed => {
						if let Some(v) = pending.lock().take() {
							observer.on_event(Event::Next(v));
						}
						observer.on_event(Event::Completed);
					}
					Event::Failed(e) => {
						pending.lock().take();
						observer.on_event(Event::Failed(e));
					}
				})
			};
			let composite = CompositeDisposable::create();
			composite.add(sub);
			composite.add(Disposable::from_arc(timer));
			Disposable::from_arc(composite)
		})
	}

	/// Emits a `next` immediately, then drops further `next`s until `dt` has
	/// elapsed since the last emission.
	pub fn throttle(&self, dt: Duration) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let last_emit: Arc<Mutex<Option<std::time::Instant>>> = Arc::new(Mutex::new(None));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let now = std::time::Instant::now();
					let mut guard = last_emit.lock();
					let should_emit = match *guard {
						None => true,
						Some(last) => now.duration_since(last) > dt,
					};
					if should_emit {
						*guard = Some(now);
						drop(guard);
						observer.on_event(Event::Next(v));
					}
				}
				other => observer.on_event(other),
			})
		})
	}

	/// Emits the most recent `next` value once per `dt`, driven by
	/// `scheduler`; a terminal cancels the sampling job.
	pub fn sample(&self, dt: Duration, scheduler: Arc<dyn Scheduler>) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let latest: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
			let job = SerialDisposable::create();
			schedule_sample_tick(latest.clone(), observer.clone(), dt, scheduler.clone(), job.clone());
			let sub = upstream.observe({
				let latest = latest.clone();
				let job = job.clone();
				move |event: Event<T, E>| match event {
					Event::Next(v) => *latest.lock() = Some(v),
					other => {
						job.dispose();
						observer.on_event(other);
					}
				}
			});
			let composite = CompositeDisposable::create();
			composite.add(sub);
			composite.add(Disposable::from_arc(job));
			Disposable::from_arc(composite)
		})
	}

	/// Re-emits every event, including terminals, `dt` after it arrived.
	/// Since the scheduler is FIFO for equal deadlines, per-event ordering
	/// survives the delay.
	pub fn delay(&self, dt: Duration, scheduler: Arc<dyn Scheduler>) -> Signal<T, E>
	where
		E: Send + 'static,
	{
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let timers = CompositeDisposable::create();
			let scheduler = scheduler.clone();
			let sub = {
				let timers = timers.clone();
				upstream.observe(move |event: Event<T, E>| {
					let observer = observer.clone();
					let handle = scheduler.schedule_after(
						dt,
						Box::new(move || observer.on_event(event)),
					);
					timers.add(handle);
				})
			};
			let composite = CompositeDisposable::create();
			composite.add(sub);
			composite.add(Disposable::from_arc(timers));
			Disposable::from_arc(composite)
		})
	}
}

impl<T: Send + Sync + 'static, E: Clone + Send + Sync + 'static> Signal<T, E> {
	/// Fails with `e` if no `next` arrives within `dt` of subscription or of
	/// the previous `next`.
	pub fn timeout(&self, dt: Duration, e: E, scheduler: Arc<dyn Scheduler>) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let timer = SerialDisposable::create();
			let arm: Arc<dyn Fn() + Send + Sync> = {
				let timer = timer.clone();
				let observer = observer.clone();
				let scheduler = scheduler.clone();
				let e = e.clone();
				Arc::new(move || {
					let observer = observer.clone();
					let e = e.clone();
					timer.set(scheduler.schedule_after(
						dt,
						Box::new(move || observer.on_event(Event::Failed(e))),
					));
				})
			};
			arm();
			let arm_for_sub = arm.clone();
			let timer_for_sub = timer.clone();
			let sub = upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					arm_for_sub();
					observer.on_event(Event::Next(v));
				}
				other => {
					timer_for_sub.dispose();
					observer.on_event(other);
				}
			});
			let composite = CompositeDisposable::create();
			composite.add(sub);
			composite.add(Disposable::from_arc(timer));
			Disposable::from_arc(composite)
		})
	}
}

impl<T: Send + Sync + 'static> Signal<T, TimeoutError> {
	/// Like [`timeout`](Signal::timeout), using [`TimeoutError`] as the
	/// synthetic failure so the caller doesn't have to supply an error value
	/// of their own.
	pub fn timeout_after(&self, dt: Duration, scheduler: Arc<dyn Scheduler>) -> Signal<T, TimeoutError> {
		self.timeout(dt, TimeoutError, scheduler)
	}
}

fn schedule_sample_tick<T: Send + 'static, E: Send + 'static>(
	latest: Arc<Mutex<Option<T>>>,
	observer: Arc<dyn Observer<T, E>>,
	dt: Duration,
	scheduler: Arc<dyn Scheduler>,
	job: Arc<SerialDisposable>,
) {
	let latest2 = latest.clone();
	let observer2 = observer.clone();
	let scheduler2 = scheduler.clone();
	let job2 = job.clone();
	let handle = scheduler.schedule_after(
		dt,
		Box::new(move || {
			if let Some(v) = latest2.lock().take() {
				observer2.on_event(Event::Next(v));
			}
			schedule_sample_tick(latest2, observer2, dt, scheduler2, job2);
		}),
	);
	job.set(handle);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests_support::ManualScheduler;
	use estuary_core::Never;

	#[test]
	fn debounce_emits_once_after_quiescence() {
		let scheduler = ManualScheduler::new();
		let bus = crate::PassthroughSubject::<i32, Never>::new();
		let debounced = bus.as_signal().debounce(Duration::from_millis(10), scheduler.clone());
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _s = debounced.observe_next(move |v| r.lock().push(v));
		bus.send_next(1);
		bus.send_next(2);
		scheduler.advance(Duration::from_millis(10));
		assert_eq!(*recorded.lock(), vec![2]);
	}

	#[test]
	fn throttle_drops_within_window() {
		let bus = crate::PassthroughSubject::<i32, Never>::new();
		let throttled = bus.as_signal().throttle(Duration::from_secs(3600));
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _s = throttled.observe_next(move |v| r.lock().push(v));
		bus.send_next(1);
		bus.send_next(2);
		assert_eq!(*recorded.lock(), vec![1]);
	}
}
