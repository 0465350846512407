use std::sync::Arc;

use estuary_core::{BlockDisposable, CompositeDisposable, Disposable, Observer};
use parking_lot::Mutex;

use crate::signal::Signal;
use crate::subject::{MulticastBus, PassthroughSubject, ReplayOneSubject, ReplaySubject};

struct ConnectState {
	connection: Option<Disposable>,
	subscribers: i64,
}

/// A cold source paired with a hot bus: `publish`/`replay`/`replay_one`'s
/// return type.
///
/// `connect()` subscribes the bus to the source exactly once, idempotently,
/// while the returned disposable is held; [`observe`](Connectable::observe)
/// (via [`as_signal`](Connectable::as_signal)) only ever subscribes to the
/// bus, so subscribers never see the underlying source re-run.
pub struct Connectable<T, E, B> {
	source: Signal<T, E>,
	bus: B,
	state: Arc<Mutex<ConnectState>>,
}

impl<T, E, B: Clone> Clone for Connectable<T, E, B> {
	fn clone(&self) -> Self {
		Self {
			source: self.source.clone(),
			bus: self.bus.clone(),
			state: self.state.clone(),
		}
	}
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static, B: MulticastBus<T, E>>
	Connectable<T, E, B>
{
	pub(crate) fn new(source: Signal<T, E>, bus: B) -> Self {
		Self {
			source,
			bus,
			state: Arc::new(Mutex::new(ConnectState {
				connection: None,
				subscribers: 0,
			})),
		}
	}

	/// Subscribes the bus to the source, if not already connected while this
	/// handle (or a clone of it) is held. Idempotent: calling again before
	/// disposing the first connection returns the same disposable.
	pub fn connect(&self) -> Disposable {
		let mut state = self.state.lock();
		if let Some(existing) = &state.connection {
			return existing.clone();
		}
		let bus = self.bus.clone();
		let connection = self.source.observe(move |event| bus.send_event(event));
		state.connection = Some(connection.clone());
		connection
	}

	/// Views the bus as a signal, without connecting it. Subscribers
	/// observe only events sent after `connect()` is (separately) called.
	pub fn as_signal(&self) -> Signal<T, E> {
		let bus = self.bus.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| bus.observe_event(observer))
	}

	/// Connects on the first subscriber and disconnects once the live
	/// subscriber count drops to `disconnect_threshold`.
	///
	/// `keep_alive` overrides `disconnect_threshold` with the spec's "`-∞`"
	/// sentinel: the connection, once made, is never torn down by ref
	/// counting.
	pub fn ref_count(&self, disconnect_threshold: i64, keep_alive: bool) -> Signal<T, E> {
		let source = self.source.clone();
		let bus = self.bus.clone();
		let state = self.state.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let mut guard = state.lock();
			guard.subscribers += 1;
			// Register with the bus before triggering the connect, not after:
			// a source that emits synchronously on subscribe (e.g. `sequence`,
			// `just`) must not fire into the bus before the very subscriber
			// that caused the 0->1 transition is listening for it.
			let subscription = bus.observe_event(observer);
			if guard.connection.is_none() {
				let bus_sink = bus.clone();
				guard.connection = Some(source.observe(move |event| bus_sink.send_event(event)));
			}
			drop(guard);

			let state2 = state.clone();
			let teardown = BlockDisposable::create(move || {
				let mut guard = state2.lock();
				guard.subscribers -= 1;
				if !keep_alive && guard.subscribers <= disconnect_threshold {
					if let Some(connection) = guard.connection.take() {
						connection.dispose();
					}
				}
			});
			let composite = CompositeDisposable::create();
			composite.add(subscription);
			composite.add(teardown);
			Disposable::from_arc(composite)
		})
	}
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> Signal<T, E> {
	/// Wraps with a [`PassthroughSubject`] bus.
	pub fn publish(&self) -> Connectable<T, E, PassthroughSubject<T, E>> {
		Connectable::new(self.clone(), PassthroughSubject::new())
	}

	/// Wraps with a [`ReplaySubject`] bus of capacity `n`.
	pub fn replay(&self, n: usize) -> Connectable<T, E, ReplaySubject<T, E>> {
		Connectable::new(self.clone(), ReplaySubject::new(n))
	}

	/// Wraps with a [`ReplayOneSubject`] bus, `replay(1)`'s specialization.
	pub fn replay_one(&self) -> Connectable<T, E, ReplayOneSubject<T, E>> {
		Connectable::new(self.clone(), ReplayOneSubject::new())
	}

	/// `publish().ref_count(disconnect_threshold, keep_alive)`: the common
	/// case of sharing one subscription to `self` across many subscribers.
	pub fn share(&self, disconnect_threshold: i64, keep_alive: bool) -> Signal<T, E> {
		self.publish().ref_count(disconnect_threshold, keep_alive)
	}

	/// `replay(n).ref_count(0, false)`: named sugar for the common "share
	/// with replay buffer" case.
	pub fn share_replay(&self, n: usize) -> Signal<T, E> {
		self.replay(n).ref_count(0, false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use estuary_core::{Event, Never};
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn connect_is_idempotent_while_held() {
		let starts = Arc::new(AtomicUsize::new(0));
		let s = starts.clone();
		let source = Signal::<i32, Never>::from_closure(move || {
			s.fetch_add(1, Ordering::SeqCst);
			1
		});
		let connectable = source.publish();
		let _c1 = connectable.connect();
		let _c2 = connectable.connect();
		assert_eq!(starts.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn ref_count_connects_on_first_and_disconnects_at_zero() {
		let live = Arc::new(AtomicUsize::new(0));
		let l1 = live.clone();
		let l2 = live.clone();
		let source = Signal::<i32, Never>::from_producer(move |observer| {
			l1.fetch_add(1, Ordering::SeqCst);
			let l3 = l2.clone();
			observer.on_event(Event::Next(1));
			estuary_core::BlockDisposable::create(move || {
				l3.fetch_sub(1, Ordering::SeqCst);
			})
		});
		let shared = source.share(0, false);
		let d1 = shared.observe(|_: Event<i32, Never>| {});
		assert_eq!(live.load(Ordering::SeqCst), 1);
		let d2 = shared.observe(|_: Event<i32, Never>| {});
		assert_eq!(live.load(Ordering::SeqCst), 1);
		d1.dispose();
		assert_eq!(live.load(Ordering::SeqCst), 1);
		d2.dispose();
		assert_eq!(live.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn ref_count_delivers_the_triggering_subscribers_synchronous_emissions() {
		// `sequence` emits every item during the `observe` call itself; the
		// subscriber whose subscription causes the 0->1 connect must still
		// see those items, not just ones sent after it happened to register.
		let shared = Signal::<i32, Never>::sequence(vec![1, 2, 3]).share(0, false);
		let recorded = Arc::new(Mutex::new(Vec::new()));
		let r = recorded.clone();
		let _sub = shared.observe_next(move |v| r.lock().push(v));
		assert_eq!(*recorded.lock(), vec![1, 2, 3]);
	}

	#[test]
	fn keep_alive_never_disconnects() {
		let live = Arc::new(AtomicUsize::new(0));
		let l1 = live.clone();
		let l2 = live.clone();
		let source = Signal::<i32, Never>::from_producer(move |_observer| {
			l1.fetch_add(1, Ordering::SeqCst);
			let l3 = l2.clone();
			estuary_core::BlockDisposable::create(move || {
				l3.fetch_sub(1, Ordering::SeqCst);
			})
		});
		let shared = source.share(0, true);
		let d = shared.observe(|_: Event<i32, Never>| {});
		d.dispose();
		assert_eq!(live.load(Ordering::SeqCst), 1);
	}
}
