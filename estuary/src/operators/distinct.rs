use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use estuary_core::{
	BlockDisposable, Completion, CompositeDisposable, Disposable, Event, Never, Observer,
	SerialDisposable,
};
use parking_lot::Mutex;

use crate::signal::Signal;

impl<T: Clone + PartialEq + Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Drops consecutive duplicates, comparing with `==`.
	pub fn distinct(&self) -> Signal<T, E> {
		self.distinct_by(|a, b| a == b)
	}
}

impl<T: Clone + Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// [`distinct`](Signal::distinct) parameterised by a custom equality,
	/// built from `zip_previous` + `compact_map`.
	pub fn distinct_by(&self, eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Signal<T, E> {
		self.zip_previous().compact_map(move |(prev, curr)| match prev {
			None => Some(curr),
			Some(p) if eq(&p, &curr) => None,
			Some(_) => Some(curr),
		})
	}

	/// Drops non-terminal events while `gate`'s latest value is `false`;
	/// terminals always pass through.
	pub fn pausable(&self, gate: Signal<bool, Never>) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let open = Arc::new(AtomicBool::new(false));
			let gate_sub = gate.observe({
				let open = open.clone();
				move |event: Event<bool, Never>| {
					if let Event::Next(v) = event {
						open.store(v, Ordering::SeqCst);
					}
				}
			});
			let main_sub = upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					if open.load(Ordering::SeqCst) {
						observer.on_event(Event::Next(v));
					}
				}
				other => observer.on_event(other),
			});
			let composite = CompositeDisposable::create();
			composite.add(gate_sub);
			composite.add(main_sub);
			Disposable::from_arc(composite)
		})
	}

	/// Resubscribes upstream up to `n` times after a failure before
	/// forwarding it.
	pub fn retry(&self, n: usize) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let serial = SerialDisposable::create();
			subscribe_retry(upstream.clone(), observer, Arc::new(Mutex::new(n)), serial.clone());
			Disposable::from_arc(serial)
		})
	}

	/// On failure, emits `v` then completes successfully instead of
	/// propagating the error.
	pub fn replace_error(&self, v: T) -> Signal<T, Never> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, Never>>| {
			let v = v.clone();
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(x) => observer.on_event(Event::Next(x)),
				Event::Completed => observer.on_event(Event::Completed),
				Event::Failed(_) => {
					observer.on_event(Event::Next(v.clone()));
					observer.on_event(Event::Completed);
				}
			})
		})
	}

	/// On failure, swaps the subscription to `recover(e)` instead of
	/// propagating the error.
	pub fn flat_map_error<F: Send + Sync + 'static>(
		&self,
		recover: impl Fn(E) -> Signal<T, F> + Send + Sync + 'static,
	) -> Signal<T, F> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, F>>| {
			let serial = SerialDisposable::create();
			let sub = {
				let observer = observer.clone();
				let serial = serial.clone();
				upstream.observe(move |event: Event<T, E>| match event {
					Event::Next(v) => observer.on_event(Event::Next(v)),
					Event::Completed => observer.on_event(Event::Completed),
					Event::Failed(e) => {
						let recovered = recover(e);
						let inner_observer = observer.clone();
						let inner_sub =
							recovered.observe(move |inner: Event<T, F>| inner_observer.on_event(inner));
						serial.set(inner_sub);
					}
				})
			};
			serial.set(sub);
			Disposable::from_arc(serial)
		})
	}
}

impl<T: Send + Sync + 'static, E: Clone + Send + Sync + 'static> Signal<T, E> {
	/// Side-effect hooks around the subscription lifecycle.
	/// `on_subscribe` runs synchronously inside
	/// `observe`; `on_completion` runs on both terminals; `on_cancel` runs
	/// only when the subscription is disposed before a terminal is
	/// delivered.
	pub fn handle_events(
		&self,
		on_subscribe: impl Fn() + Send + Sync + 'static,
		on_next: impl Fn(&T) + Send + Sync + 'static,
		on_completion: impl Fn(&Completion<E>) + Send + Sync + 'static,
		on_cancel: impl Fn() + Send + Sync + 'static,
	) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			on_subscribe();
			let terminated = Arc::new(AtomicBool::new(false));
			let sub = {
				let terminated = terminated.clone();
				upstream.observe(move |event: Event<T, E>| {
					match &event {
						Event::Next(v) => on_next(v),
						Event::Completed => {
							terminated.store(true, Ordering::SeqCst);
							on_completion(&Completion::Finished);
						}
						Event::Failed(e) => {
							terminated.store(true, Ordering::SeqCst);
							on_completion(&Completion::Failure(e.clone()));
						}
					}
					observer.on_event(event);
				})
			};
			let cancel_hook = BlockDisposable::create(move || {
				if !terminated.load(Ordering::SeqCst) {
					on_cancel();
				}
			});
			let composite = CompositeDisposable::create();
			composite.add(sub);
			composite.add(cancel_hook);
			Disposable::from_arc(composite)
		})
	}
}

fn subscribe_retry<T: Send + Sync + 'static, E: Send + Sync + 'static>(
	upstream: Signal<T, E>,
	observer: Arc<dyn Observer<T, E>>,
	attempts_left: Arc<Mutex<usize>>,
	serial: Arc<SerialDisposable>,
) {
	let upstream2 = upstream.clone();
	let observer2 = observer.clone();
	let attempts2 = attempts_left.clone();
	let serial2 = serial.clone();
	let sub = upstream.observe(move |event: Event<T, E>| match event {
		Event::Failed(e) => {
			let should_retry = {
				let mut left = attempts2.lock();
				if *left > 0 {
					*left -= 1;
					true
				} else {
					false
				}
			};
			if should_retry {
				subscribe_retry(upstream2.clone(), observer2.clone(), attempts2.clone(), serial2.clone());
			} else {
				observer2.on_event(Event::Failed(e));
			}
		}
		other => observer2.on_event(other),
	});
	serial.set(sub);
}

#[cfg(test)]
mod tests {
	use super::*;

	fn to_vec<T: Clone + Send + Sync + 'static>(s: &Signal<T, Never>) -> Vec<T> {
		let out = Arc::new(Mutex::new(Vec::new()));
		let o = out.clone();
		s.observe_next(move |v| o.lock().push(v));
		out.lock().clone()
	}

	#[test]
	fn distinct_drops_consecutive_duplicates() {
		let s = Signal::<i32, Never>::sequence(vec![1, 1, 2, 2, 2, 3, 1]).distinct();
		assert_eq!(to_vec(&s), vec![1, 2, 3, 1]);
	}

	#[test]
	fn retry_resubscribes_on_failure_until_exhausted() {
		let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
		let a = attempts.clone();
		let source = Signal::<i32, &'static str>::from_producer(move |observer| {
			let n = a.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			if n < 2 {
				observer.on_event(Event::Failed("boom"));
			} else {
				observer.on_event(Event::Next(42));
				observer.on_event(Event::Completed);
			}
			Disposable::noop()
		});
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		source.retry(5).observe(move |e: Event<i32, &'static str>| r.lock().push(e));
		assert_eq!(*recorded.lock(), vec![Event::Next(42), Event::Completed]);
		assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
	}

	#[test]
	fn replace_error_emits_fallback_then_completes() {
		let source = Signal::<i32, &'static str>::error("boom");
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		source
			.replace_error(0)
			.observe(move |e: Event<i32, Never>| r.lock().push(e));
		assert_eq!(*recorded.lock(), vec![Event::Next(0), Event::Completed]);
	}
}
