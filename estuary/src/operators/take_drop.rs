use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use estuary_core::{
	Cancellable, CompositeDisposable, Disposable, Event, Observer, Scheduler, SerialDisposable,
};
use parking_lot::Mutex;

use crate::signal::Signal;

impl<T: Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Emits at most `n` elements, then completes and disposes upstream.
	pub fn prefix(&self, n: usize) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			if n == 0 {
				observer.on_event(Event::Completed);
				return Disposable::noop();
			}
			let count = Arc::new(Mutex::new(0usize));
			let serial = SerialDisposable::create();
			let sub = {
				let count = count.clone();
				let serial = serial.clone();
				upstream.observe(move |event: Event<T, E>| match event {
					Event::Next(v) => {
						let mut c = count.lock();
						if *c >= n {
							return;
						}
						*c += 1;
						let reached = *c == n;
						drop(c);
						observer.on_event(Event::Next(v));
						if reached {
							observer.on_event(Event::Completed);
							serial.dispose();
						}
					}
					other => observer.on_event(other),
				})
			};
			serial.set(sub);
			Disposable::from_arc(serial)
		})
	}

	/// Emits elements until `p` first fails, then completes.
	pub fn prefix_while(&self, p: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let serial = SerialDisposable::create();
			let sub = {
				let serial = serial.clone();
				upstream.observe(move |event: Event<T, E>| match event {
					Event::Next(v) => {
						if p(&v) {
							observer.on_event(Event::Next(v));
						} else {
							observer.on_event(Event::Completed);
							serial.dispose();
						}
					}
					other => observer.on_event(other),
				})
			};
			serial.set(sub);
			Disposable::from_arc(serial)
		})
	}

	/// Emits `self`'s elements until `other` produces any event, at which
	/// point the output completes.
	pub fn prefix_until_output_from<U: Send + Sync + 'static, F: Send + Sync + 'static>(
		&self,
		other: Signal<U, F>,
	) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let composite = CompositeDisposable::create();
			let stopped = Arc::new(Mutex::new(false));
			let main_sub = {
				let observer = observer.clone();
				let stopped = stopped.clone();
				upstream.observe(move |event: Event<T, E>| {
					if *stopped.lock() {
						return;
					}
					observer.on_event(event);
				})
			};
			composite.add(main_sub);
			let other_sub = {
				let stopped = stopped.clone();
				let composite = composite.clone();
				other.observe(move |_event: Event<U, F>| {
					let mut guard = stopped.lock();
					if *guard {
						return;
					}
					*guard = true;
					drop(guard);
					observer.on_event(Event::Completed);
					composite.dispose();
				})
			};
			composite.add(other_sub);
			Disposable::from_arc(composite)
		})
	}

	/// Drops the first `n` elements, forwards the rest and all terminals.
	pub fn drop_first(&self, n: usize) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let count = Arc::new(Mutex::new(0usize));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let mut c = count.lock();
					if *c < n {
						*c += 1;
						return;
					}
					drop(c);
					observer.on_event(Event::Next(v));
				}
				other => observer.on_event(other),
			})
		})
	}

	/// Drops all elements emitted within `dt` of subscribing.
	pub fn drop_first_for(&self, dt: Duration, scheduler: Arc<dyn Scheduler>) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let allowed = Arc::new(AtomicBool::new(false));
			let arm = allowed.clone();
			let timer = scheduler.schedule_after(
				dt,
				Box::new(move || arm.store(true, Ordering::SeqCst)),
			);
			let sub = {
				let allowed = allowed.clone();
				upstream.observe(move |event: Event<T, E>| match event {
					Event::Next(v) => {
						if allowed.load(Ordering::SeqCst) {
							observer.on_event(Event::Next(v));
						}
					}
					other => observer.on_event(other),
				})
			};
			let composite = CompositeDisposable::create();
			composite.add(sub);
			composite.add(timer);
			Disposable::from_arc(composite)
		})
	}
}

impl<T: Clone + Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Buffers the last `n` elements and flushes them before completion;
	/// a failure discards the pending buffer.
	pub fn suffix(&self, n: usize) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let buffer: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::with_capacity(n)));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let mut buf = buffer.lock();
					if n == 0 {
						return;
					}
					if buf.len() == n {
						buf.pop_front();
					}
					buf.push_back(v);
				}
				Event::Completed => {
					let drained = std::mem::take(&mut *buffer.lock());
					for v in drained {
						observer.on_event(Event::Next(v));
					}
					observer.on_event(Event::Completed);
				}
				Event::Failed(e) => {
					buffer.lock().clear();
					observer.on_event(Event::Failed(e));
				}
			})
		})
	}

	/// Withholds the last `n` elements for good: they're only ever known to
	/// be "the last `n`" once the stream ends, by which point there is
	/// nothing left to emit them to.
	pub fn drop_last(&self, n: usize) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let buffer: Arc<Mutex<VecDeque<T>>> =
				Arc::new(Mutex::new(VecDeque::with_capacity(n + 1)));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let mut buf = buffer.lock();
					buf.push_back(v);
					if buf.len() > n {
						let out = buf.pop_front();
						drop(buf);
						if let Some(out) = out {
							observer.on_event(Event::Next(out));
						}
					}
				}
				Event::Completed => {
					buffer.lock().clear();
					observer.on_event(Event::Completed);
				}
				Event::Failed(e) => {
					buffer.lock().clear();
					observer.on_event(Event::Failed(e));
				}
			})
		})
	}

	/// `prefix(1)`.
	pub fn first(&self) -> Signal<T, E> {
		self.prefix(1)
	}

	/// `suffix(1)`.
	pub fn last(&self) -> Signal<T, E> {
		self.suffix(1)
	}

	/// Drops every `next`, forwarding only the terminal event.
	pub fn ignore_output(&self) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			upstream.observe(move |event: Event<T, E>| {
				if event.is_terminal() {
					observer.on_event(event);
				}
			})
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use estuary_core::Never;

	fn to_vec<T: Clone + Send + Sync + 'static>(s: &Signal<T, Never>) -> Vec<T> {
		let out = Arc::new(Mutex::new(Vec::new()));
		let o = out.clone();
		s.observe_next(move |v| o.lock().push(v));
		out.lock().clone()
	}

	#[test]
	fn prefix_caps_and_disposes_upstream() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3, 4, 5]).prefix(2);
		assert_eq!(to_vec(&s), vec![1, 2]);
	}

	#[test]
	fn prefix_while_stops_at_first_failure() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3, -1, 4]).prefix_while(|x| *x > 0);
		assert_eq!(to_vec(&s), vec![1, 2, 3]);
	}

	#[test]
	fn suffix_flushes_last_n_on_completion() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3, 4, 5]).suffix(2);
		assert_eq!(to_vec(&s), vec![4, 5]);
	}

	#[test]
	fn drop_first_skips_n() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3, 4]).drop_first(2);
		assert_eq!(to_vec(&s), vec![3, 4]);
	}

	#[test]
	fn drop_last_withholds_trailing_n() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3, 4]).drop_last(2);
		assert_eq!(to_vec(&s), vec![1, 2]);
	}

	#[test]
	fn first_and_last() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3]);
		assert_eq!(to_vec(&s.first()), vec![1]);
		assert_eq!(to_vec(&s.last()), vec![3]);
	}

	#[test]
	fn ignore_output_drops_every_next() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3]).ignore_output();
		assert_eq!(to_vec(&s), Vec::<i32>::new());

		let seen = Arc::new(Mutex::new(Vec::new()));
		let o = seen.clone();
		Signal::<i32, Never>::sequence(vec![1, 2, 3])
			.ignore_output()
			.observe_fn(move |event| o.lock().push(event));
		assert_eq!(*seen.lock(), vec![Event::Completed]);
	}
}
