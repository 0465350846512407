use std::collections::VecDeque;
use std::sync::Arc;

use estuary_core::{Cancellable, CompositeDisposable, Disposable, Event, Observer, SerialDisposable};
use parking_lot::Mutex;

use crate::signal::Signal;

struct CombineState<A, B> {
	a: Option<A>,
	b: Option<B>,
	done_a: bool,
	done_b: bool,
}

impl<T: Clone + Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Emits `f(latest_a, latest_b)` whenever either side produces a value
	/// and both have emitted at least once; completes once both sides have.
	/// The first failure from either side propagates immediately.
	pub fn combine_latest<B: Clone + Send + Sync + 'static, U: Send + Sync + 'static>(
		&self,
		other: Signal<B, E>,
		f: impl Fn(T, B) -> U + Send + Sync + 'static,
	) -> Signal<U, E> {
		let a_signal = self.clone();
		let f = Arc::new(f);
		Signal::from_producer(move |observer: Arc<dyn Observer<U, E>>| {
			let state = Arc::new(Mutex::new(CombineState {
				a: None,
				b: None,
				done_a: false,
				done_b: false,
			}));
			let composite = CompositeDisposable::create();

			let sub_a = a_signal.observe({
				let state = state.clone();
				let observer = observer.clone();
				let f = f.clone();
				move |event: Event<T, E>| match event {
					Event::Next(v) => {
						let pair = {
							let mut s = state.lock();
							s.a = Some(v);
							s.a.clone().zip(s.b.clone())
						};
						if let Some((a, b)) = pair {
							observer.on_event(Event::Next((*f)(a, b)));
						}
					}
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {
						let both_done = {
							let mut s = state.lock();
							s.done_a = true;
							s.done_a && s.done_b
						};
						if both_done {
							observer.on_event(Event::Completed);
						}
					}
				}
			});
			composite.add(sub_a);

			let sub_b = other.observe({
				let state = state.clone();
				let observer = observer.clone();
				let f = f.clone();
				move |event: Event<B, E>| match event {
					Event::Next(v) => {
						let pair = {
							let mut s = state.lock();
							s.b = Some(v);
							s.a.clone().zip(s.b.clone())
						};
						if let Some((a, b)) = pair {
							observer.on_event(Event::Next((*f)(a, b)));
						}
					}
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {
						let both_done = {
							let mut s = state.lock();
							s.done_b = true;
							s.done_a && s.done_b
						};
						if both_done {
							observer.on_event(Event::Completed);
						}
					}
				}
			});
			composite.add(sub_b);

			Disposable::from_arc(composite)
		})
	}

	/// Pairs up `self` and `other` positionally: `f(nth_a, nth_b)` for every
	/// `n`. Emits exactly `min(len(a), len(b))` values.
	pub fn zip<B: Send + Sync + 'static, U: Send + Sync + 'static>(
		&self,
		other: Signal<B, E>,
		f: impl Fn(T, B) -> U + Send + Sync + 'static,
	) -> Signal<U, E> {
		let a_signal = self.clone();
		let f = Arc::new(f);
		Signal::from_producer(move |observer: Arc<dyn Observer<U, E>>| {
			let qa: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));
			let qb: Arc<Mutex<VecDeque<B>>> = Arc::new(Mutex::new(VecDeque::new()));
			let done_a = Arc::new(Mutex::new(false));
			let done_b = Arc::new(Mutex::new(false));
			let completed = Arc::new(Mutex::new(false));
			let composite = CompositeDisposable::create();

			// Exhausted once either finished side's own queue has drained: at
			// that point no further pairing can ever occur, regardless of how
			// many items are still queued on the other side.
			let maybe_complete = {
				let qa = qa.clone();
				let qb = qb.clone();
				let done_a = done_a.clone();
				let done_b = done_b.clone();
				let completed = completed.clone();
				move |observer: &Arc<dyn Observer<U, E>>| {
					let exhausted =
						(*done_a.lock() && qa.lock().is_empty()) || (*done_b.lock() && qb.lock().is_empty());
					if exhausted {
						let mut completed = completed.lock();
						if !*completed {
							*completed = true;
							observer.on_event(Event::Completed);
						}
					}
				}
			};

			let sub_a = a_signal.observe({
				let qa = qa.clone();
				let qb = qb.clone();
				let observer = observer.clone();
				let f = f.clone();
				let done_a = done_a.clone();
				let maybe_complete = maybe_complete.clone();
				move |event: Event<T, E>| match event {
					Event::Next(v) => {
						qa.lock().push_back(v);
						drain_zip(&qa, &qb, &f, &observer);
						maybe_complete(&observer);
					}
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {
						*done_a.lock() = true;
						maybe_complete(&observer);
					}
				}
			});
			composite.add(sub_a);

			let sub_b = other.observe({
				let qa = qa.clone();
				let qb = qb.clone();
				let observer = observer.clone();
				let f = f.clone();
				let done_b = done_b.clone();
				let maybe_complete = maybe_complete.clone();
				move |event: Event<B, E>| match event {
					Event::Next(v) => {
						qb.lock().push_back(v);
						drain_zip(&qa, &qb, &f, &observer);
						maybe_complete(&observer);
					}
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {
						*done_b.lock() = true;
						maybe_complete(&observer);
					}
				}
			});
			composite.add(sub_b);

			Disposable::from_arc(composite)
		})
	}
}

fn drain_zip<T, B, U, E>(
	qa: &Arc<Mutex<VecDeque<T>>>,
	qb: &Arc<Mutex<VecDeque<B>>>,
	f: &Arc<dyn Fn(T, B) -> U + Send + Sync>,
	observer: &Arc<dyn Observer<U, E>>,
) {
	loop {
		let pair = {
			let mut qa = qa.lock();
			let mut qb = qb.lock();
			if qa.is_empty() || qb.is_empty() {
				None
			} else {
				Some((qa.pop_front().unwrap(), qb.pop_front().unwrap()))
			}
		};
		match pair {
			Some((a, b)) => observer.on_event(Event::Next(f(a, b))),
			None => break,
		}
	}
}

impl<T: Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Subscribes both sources and forwards every `next`; completes once
	/// both have completed. A failure from either side propagates
	/// immediately.
	pub fn merge(&self, other: Signal<T, E>) -> Signal<T, E> {
		let a = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let remaining = Arc::new(Mutex::new(2usize));
			let composite = CompositeDisposable::create();
			let sub_a = a.observe({
				let observer = observer.clone();
				let remaining = remaining.clone();
				move |event: Event<T, E>| match event {
					Event::Completed => {
						let done = {
							let mut r = remaining.lock();
							*r -= 1;
							*r == 0
						};
						if done {
							observer.on_event(Event::Completed);
						}
					}
					other => observer.on_event(other),
				}
			});
			composite.add(sub_a);
			let sub_b = other.observe({
				let observer = observer.clone();
				let remaining = remaining.clone();
				move |event: Event<T, E>| match event {
					Event::Completed => {
						let done = {
							let mut r = remaining.lock();
							*r -= 1;
							*r == 0
						};
						if done {
							observer.on_event(Event::Completed);
						}
					}
					other => observer.on_event(other),
				}
			});
			composite.add(sub_b);
			Disposable::from_arc(composite)
		})
	}

	/// Subscribes `self`; once it completes, subscribes `other` and
	/// forwards it too. A failure on `self` propagates without ever
	/// subscribing `other`.
	pub fn append_signal(&self, other: Signal<T, E>) -> Signal<T, E> {
		let a = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let serial = SerialDisposable::create();
			let other2 = other.clone();
			let sub = a.observe({
				let observer = observer.clone();
				let serial = serial.clone();
				move |event: Event<T, E>| match event {
					Event::Completed => {
						let next_sub = other2.observe({
							let observer = observer.clone();
							move |inner: Event<T, E>| observer.on_event(inner)
						});
						serial.set(next_sub);
					}
					other => observer.on_event(other),
				}
			});
			serial.set(sub);
			Disposable::from_arc(serial)
		})
	}

	/// Subscribes both; whichever emits first wins, and the loser is
	/// disposed immediately. Ties under truly simultaneous emission are
	/// resolved in favour of whichever callback the runtime happens to
	/// invoke first; this is left implementation-defined.
	pub fn amb(&self, other: Signal<T, E>) -> Signal<T, E> {
		let a = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let winner: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
			let composite = CompositeDisposable::create();
			let sub_a = {
				let winner = winner.clone();
				let observer = observer.clone();
				let composite = composite.clone();
				a.observe(move |event: Event<T, E>| {
					let is_winner = {
						let mut w = winner.lock();
						match *w {
							None => {
								*w = Some(true);
								true
							}
							Some(is_a) => is_a,
						}
					};
					if is_winner {
						observer.on_event(event);
					} else {
						composite.dispose();
					}
				})
			};
			composite.add(sub_a);
			let sub_b = {
				let winner = winner.clone();
				let observer = observer.clone();
				let composite = composite.clone();
				other.observe(move |event: Event<T, E>| {
					let is_winner = {
						let mut w = winner.lock();
						match *w {
							None => {
								*w = Some(false);
								true
							}
							Some(is_a) => !is_a,
						}
					};
					if is_winner {
						observer.on_event(event);
					} else {
						composite.dispose();
					}
				})
			};
			composite.add(sub_b);
			Disposable::from_arc(composite)
		})
	}

	/// Emits `f(x, other.latest)` for every `self` value once `other` has
	/// produced at least one value; `self`'s terminals forward, `other`'s
	/// are swallowed except failure, which propagates.
	pub fn with_latest_from<B: Clone + Send + Sync + 'static, U: Send + Sync + 'static>(
		&self,
		other: Signal<B, E>,
		f: impl Fn(T, B) -> U + Send + Sync + 'static,
	) -> Signal<U, E> {
		let a = self.clone();
		let f = Arc::new(f);
		Signal::from_producer(move |observer: Arc<dyn Observer<U, E>>| {
			let latest: Arc<Mutex<Option<B>>> = Arc::new(Mutex::new(None));
			let composite = CompositeDisposable::create();
			let other_sub = other.observe({
				let latest = latest.clone();
				let observer = observer.clone();
				move |event: Event<B, E>| match event {
					Event::Next(v) => *latest.lock() = Some(v),
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {}
				}
			});
			composite.add(other_sub);
			let main_sub = a.observe({
				let latest = latest.clone();
				let f = f.clone();
				move |event: Event<T, E>| match event {
					Event::Next(v) => {
						if let Some(b) = latest.lock().clone() {
							observer.on_event(Event::Next((*f)(v, b)));
						}
					}
					other => observer.on_event(other),
				}
			});
			composite.add(main_sub);
			Disposable::from_arc(composite)
		})
	}

	/// Re-emits `self`'s latest value each time `gate` emits, the way
	/// `sample` re-emits on a timer instead of on another signal's
	/// emissions.
	pub fn replay_latest<G: Send + Sync + 'static>(&self, gate: Signal<G, estuary_core::Never>) -> Signal<T, E>
	where
		T: Clone,
	{
		let a = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let latest: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
			let composite = CompositeDisposable::create();
			let main_sub = a.observe({
				let latest = latest.clone();
				let observer = observer.clone();
				move |event: Event<T, E>| match event {
					Event::Next(v) => *latest.lock() = Some(v),
					other => observer.on_event(other),
				}
			});
			composite.add(main_sub);
			let gate_sub = gate.observe({
				let latest = latest.clone();
				move |event: Event<G, estuary_core::Never>| {
					if let Event::Next(_) = event {
						if let Some(v) = latest.lock().clone() {
							observer.on_event(Event::Next(v));
						}
					}
				}
			});
			composite.add(gate_sub);
			Disposable::from_arc(composite)
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
	fn zip_emits_min_length() {
		let a = Signal::<i32, Never>::sequence(vec![1, 2, 3]);
		let b = Signal::<i32, Never>::sequence(vec![10, 20]);
		let s = a.zip(b, |x, y| x + y);
		assert_eq!(to_vec(&s), vec![11, 22]);
	}

	#[test]
	fn zip_completes_once_the_shorter_finished_side_drains_even_if_subscribed_first() {
		// `a` is shorter and completes while its subscribe call runs (before
		// `b` even starts draining), leaving `qa` momentarily non-empty; the
		// signal must still terminate once `b`'s later emissions drain it.
		let a = Signal::<i32, Never>::sequence(vec![1, 2]);
		let b = Signal::<i32, Never>::sequence(vec![10, 20, 30]);
		let s = a.zip(b, |x, y| x + y);
		let completed = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let c = completed.clone();
		let values = Arc::new(Mutex::new(Vec::new()));
		let v = values.clone();
		s.observe(move |event: Event<i32, Never>| match event {
			Event::Next(x) => v.lock().push(x),
			Event::Completed => c.store(true, std::sync::atomic::Ordering::SeqCst),
			Event::Failed(never) => match never {},
		});
		assert_eq!(*values.lock(), vec![11, 22]);
		assert!(completed.load(std::sync::atomic::Ordering::SeqCst));
	}

	#[test]
	fn merge_is_a_multiset_union_for_finite_sources() {
		let a = Signal::<i32, Never>::sequence(vec![1, 2]);
		let b = Signal::<i32, Never>::sequence(vec![3, 4]);
		let mut values = to_vec(&a.merge(b));
		values.sort_unstable();
		assert_eq!(values, vec![1, 2, 3, 4]);
	}

	#[test]
	fn append_skips_second_source_on_failure() {
		let a = Signal::<i32, &'static str>::error("boom");
		let b_started = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let b_flag = b_started.clone();
		let b = Signal::<i32, &'static str>::from_producer(move |observer| {
			b_flag.store(true, std::sync::atomic::Ordering::SeqCst);
			observer.on_event(Event::Next(1));
			observer.on_event(Event::Completed);
			Disposable::noop()
		});
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		a.append_signal(b)
			.observe(move |e: Event<i32, &'static str>| r.lock().push(e));
		assert!(!b_started.load(std::sync::atomic::Ordering::SeqCst));
		assert_eq!(*recorded.lock(), vec![Event::Failed("boom")]);
	}

	#[test]
	fn amb_forwards_only_the_first_side_to_emit() {
		let a = Signal::<i32, Never>::sequence(vec![1, 2]);
		let b = Signal::<i32, Never>::sequence(vec![3, 4]);
		assert_eq!(to_vec(&a.amb(b)), vec![1, 2]);
	}

	#[test]
	fn combine_latest_is_commutative() {
		let a = Signal::<i32, Never>::sequence(vec![1, 2]);
		let b = Signal::<i32, Never>::sequence(vec![10, 20]);
		let forward = to_vec(&a.combine_latest(b.clone(), |x, y| (x, y)));
		let backward = to_vec(&b.combine_latest(a, |y, x| (x, y)));
		assert_eq!(forward, backward);
	}
}
