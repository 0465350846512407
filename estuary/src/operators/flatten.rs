use std::sync::Arc;

use estuary_core::{CompositeDisposable, Disposable, Event, Observer, SerialDisposable};
use parking_lot::Mutex;

use crate::signal::Signal;

/// Which inner-signal strategy [`Signal::flat_map`]/[`Signal::flatten`] use
/// to combine the signals an outer signal emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlattenStrategy {
	/// Subscribes every inner signal as it arrives and merges their output.
	Merge,
	/// Keeps only the most recently emitted inner signal subscribed,
	/// disposing the previous one.
	Latest,
	/// Runs inner signals one at a time, in the order the outer signal
	/// emitted them.
	Concat,
}

impl<T: Send + Sync + 'static, E: Send + Sync + 'static> Signal<Signal<T, E>, E> {
	/// Flattens a signal-of-signals per `strategy`.
	pub fn flatten(&self, strategy: FlattenStrategy) -> Signal<T, E> {
		match strategy {
			FlattenStrategy::Merge => self.flatten_merge(),
			FlattenStrategy::Latest => self.flatten_latest(),
			FlattenStrategy::Concat => self.flatten_concat(),
		}
	}

	/// Subscribes every inner signal as it arrives; completes once the
	/// outer signal and every inner signal it produced have completed.
	fn flatten_merge(&self) -> Signal<T, E> {
		let outer = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let state = Arc::new(Mutex::new((false, 0usize)));
			let composite = CompositeDisposable::create();

			let outer_sub = outer.observe({
				let state = state.clone();
				let observer = observer.clone();
				let composite = composite.clone();
				move |event: Event<Signal<T, E>, E>| match event {
					Event::Next(inner) => {
						state.lock().1 += 1;
						let state2 = state.clone();
						let observer2 = observer.clone();
						let inner_sub = inner.observe(move |inner_event: Event<T, E>| match inner_event {
							Event::Next(v) => observer2.on_event(Event::Next(v)),
							Event::Failed(e) => observer2.on_event(Event::Failed(e)),
							Event::Completed => {
								let done = {
									let mut s = state2.lock();
									s.1 -= 1;
									s.0 && s.1 == 0
								};
								if done {
									observer2.on_event(Event::Completed);
								}
							}
						});
						composite.add(inner_sub);
					}
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {
						let done = {
							let mut s = state.lock();
							s.0 = true;
							s.0 && s.1 == 0
						};
						if done {
							observer.on_event(Event::Completed);
						}
					}
				}
			});
			composite.add(outer_sub);
			Disposable::from_arc(composite)
		})
	}

	/// Subscribes only the most recently emitted inner signal, dropping the
	/// previous subscription; completes once the outer signal has completed
	/// and the current inner signal has too (a.k.a. `switchToLatest`).
	fn flatten_latest(&self) -> Signal<T, E> {
		let outer = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let outer_done = Arc::new(Mutex::new(false));
			let inner_live = Arc::new(Mutex::new(false));
			let inner_slot = SerialDisposable::create();
			let composite = CompositeDisposable::create();

			let outer_sub = outer.observe({
				let outer_done = outer_done.clone();
				let inner_live = inner_live.clone();
				let inner_slot = inner_slot.clone();
				let observer = observer.clone();
				move |event: Event<Signal<T, E>, E>| match event {
					Event::Next(inner) => {
						*inner_live.lock() = true;
						let outer_done2 = outer_done.clone();
						let inner_live2 = inner_live.clone();
						let observer2 = observer.clone();
						let sub = inner.observe(move |inner_event: Event<T, E>| match inner_event {
							Event::Next(v) => observer2.on_event(Event::Next(v)),
							Event::Failed(e) => observer2.on_event(Event::Failed(e)),
							Event::Completed => {
								*inner_live2.lock() = false;
								if *outer_done2.lock() {
									observer2.on_event(Event::Completed);
								}
							}
						});
						inner_slot.set(sub);
					}
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {
						let done = {
							*outer_done.lock() = true;
							!*inner_live.lock()
						};
						if done {
							observer.on_event(Event::Completed);
						}
					}
				}
			});
			composite.add(outer_sub);
			composite.add(Disposable::from_arc(inner_slot));
			Disposable::from_arc(composite)
		})
	}

	/// Queues inner signals and runs them one at a time in arrival order,
	/// so two overlapping inner signals never interleave.
	fn flatten_concat(&self) -> Signal<T, E> {
		let outer = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let queue: Arc<Mutex<std::collections::VecDeque<Signal<T, E>>>> =
				Arc::new(Mutex::new(std::collections::VecDeque::new()));
			let running = Arc::new(Mutex::new(false));
			let outer_done = Arc::new(Mutex::new(false));
			let active = SerialDisposable::create();
			let composite = CompositeDisposable::create();

			let outer_sub = outer.observe({
				let queue = queue.clone();
				let running = running.clone();
				let outer_done = outer_done.clone();
				let active = active.clone();
				let observer = observer.clone();
				move |event: Event<Signal<T, E>, E>| match event {
					Event::Next(inner) => {
						queue.lock().push_back(inner);
						pump_concat(&queue, &running, &outer_done, &active, &observer);
					}
					Event::Failed(e) => observer.on_event(Event::Failed(e)),
					Event::Completed => {
						let done = {
							*outer_done.lock() = true;
							!*running.lock() && queue.lock().is_empty()
						};
						if done {
							observer.on_event(Event::Completed);
						}
					}
				}
			});
			composite.add(outer_sub);
			composite.add(Disposable::from_arc(active));
			Disposable::from_arc(composite)
		})
	}
}

#[allow(clippy::type_complexity)]
fn pump_concat<T: Send + Sync + 'static, E: Send + Sync + 'static>(
	queue: &Arc<Mutex<std::collections::VecDeque<Signal<T, E>>>>,
	running: &Arc<Mutex<bool>>,
	outer_done: &Arc<Mutex<bool>>,
	active: &Arc<SerialDisposable>,
	observer: &Arc<dyn Observer<T, E>>,
) {
	let next = {
		let mut running_guard = running.lock();
		if *running_guard {
			return;
		}
		let next = queue.lock().pop_front();
		if next.is_some() {
			*running_guard = true;
		}
		next
	};
	let inner = match next {
		Some(inner) => inner,
		None => return,
	};
	let queue2 = queue.clone();
	let running2 = running.clone();
	let outer_done2 = outer_done.clone();
	let active2 = active.clone();
	let observer2 = observer.clone();
	let sub = inner.observe(move |event: Event<T, E>| match event {
		Event::Next(v) => observer2.on_event(Event::Next(v)),
		Event::Failed(e) => observer2.on_event(Event::Failed(e)),
		Event::Completed => {
			*running2.lock() = false;
			let done = *outer_done2.lock() && queue2.lock().is_empty();
			if done {
				observer2.on_event(Event::Completed);
			} else {
				pump_concat(&queue2, &running2, &outer_done2, &active2, &observer2);
			}
		}
	});
	active.set(sub);
}

impl<T: Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// `map(f).flatten(strategy)`.
	pub fn flat_map<U: Send + Sync + 'static>(
		&self,
		strategy: FlattenStrategy,
		f: impl Fn(T) -> Signal<U, E> + Send + Sync + 'static,
	) -> Signal<U, E> {
		self.map(f).flatten(strategy)
	}
}
