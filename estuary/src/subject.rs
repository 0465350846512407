use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use estuary_core::{
	Completion, Disposable, Event, GuardedObserver, Observer,
};
use parking_lot::ReentrantMutex;

use crate::signal::Signal;

/// How a subject variant remembers past events for late subscribers.
trait ReplayStrategy<T, E>: Send + Sync {
	fn record(&mut self, event: &Event<T, E>);
	fn replay_to(&self, observer: &dyn Observer<T, E>);
}

struct NoReplay;
impl<T, E> ReplayStrategy<T, E> for NoReplay {
	fn record(&mut self, _event: &Event<T, E>) {}
	fn replay_to(&self, _observer: &dyn Observer<T, E>) {}
}

/// Ring buffer capped at `n + 1` so a terminal event is always retained
/// even after `n` non-terminal events have already pushed it out.
struct ReplayN<T, E> {
	capacity: usize,
	buffer: std::collections::VecDeque<Event<T, E>>,
}

impl<T: Clone, E: Clone> ReplayStrategy<T, E> for ReplayN<T, E> {
	fn record(&mut self, event: &Event<T, E>) {
		self.buffer.push_back(event.clone());
		while self.buffer.len() > self.capacity + 1 {
			self.buffer.pop_front();
		}
	}

	fn replay_to(&self, observer: &dyn Observer<T, E>) {
		for event in &self.buffer {
			observer.on_event(event.clone());
		}
	}
}

/// Stores the most recent non-terminal event and the terminal event (if
/// any) independently, replayed in that order.
#[derive(Default)]
struct ReplayOne<T, E> {
	last_non_terminal: Option<Event<T, E>>,
	terminal: Option<Event<T, E>>,
}

impl<T: Clone, E: Clone> ReplayStrategy<T, E> for ReplayOne<T, E> {
	fn record(&mut self, event: &Event<T, E>) {
		if event.is_terminal() {
			self.terminal = Some(event.clone());
		} else {
			self.last_non_terminal = Some(event.clone());
		}
	}

	fn replay_to(&self, observer: &dyn Observer<T, E>) {
		if let Some(event) = &self.last_non_terminal {
			observer.on_event(event.clone());
		}
		if let Some(event) = &self.terminal {
			observer.on_event(event.clone());
		}
	}
}

struct SubjectState<T, E> {
	observers: Vec<(u64, Arc<dyn Observer<T, E>>)>,
	pending_removal: HashSet<u64>,
	next_token: u64,
	terminated: bool,
	strategy: Box<dyn ReplayStrategy<T, E>>,
}

struct SubjectCore<T, E> {
	lock: ReentrantMutex<RefCell<SubjectState<T, E>>>,
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> SubjectCore<T, E> {
	fn new(strategy: Box<dyn ReplayStrategy<T, E>>) -> Self {
		Self {
			lock: ReentrantMutex::new(RefCell::new(SubjectState {
				observers: Vec::new(),
				pending_removal: HashSet::new(),
				next_token: 0,
				terminated: false,
				strategy,
			})),
		}
	}

	fn send(&self, event: Event<T, E>) {
		let guard = self.lock.lock();
		let snapshot = {
			let mut state = guard.borrow_mut();
			if state.terminated {
				return;
			}
			state.terminated = event.is_terminal();
			state.strategy.record(&event);
			let pending = std::mem::take(&mut state.pending_removal);
			state.observers.retain(|(token, _)| !pending.contains(token));
			state
				.observers
				.iter()
				.map(|(_, observer)| observer.clone())
				.collect::<Vec<_>>()
		};
		for observer in &snapshot {
			observer.on_event(event.clone());
		}
	}

	fn observe(self: &Arc<Self>, observer: impl Observer<T, E> + 'static) -> Disposable {
		let (guarded, guard_disposable) = GuardedObserver::new(Arc::new(observer));
		let token = {
			let guard = self.lock.lock();
			let mut state = guard.borrow_mut();
			state.strategy.replay_to(&*guarded);
			let token = state.next_token;
			state.next_token += 1;
			state
				.observers
				.push((token, guarded.clone() as Arc<dyn Observer<T, E>>));
			token
		};
		let this = self.clone();
		let removal = estuary_core::BlockDisposable::create(move || {
			let guard = this.lock.lock();
			guard.borrow_mut().pending_removal.insert(token);
		});
		let composite = estuary_core::CompositeDisposable::create();
		composite.add(guard_disposable);
		composite.add(removal);
		Disposable::from_arc(composite)
	}

	fn observer_count(&self) -> usize {
		let guard = self.lock.lock();
		guard.borrow().observers.len()
	}
}

macro_rules! subject_variant {
	($name:ident, $doc:literal) => {
		#[doc = $doc]
		pub struct $name<T, E = estuary_core::Never> {
			core: Arc<SubjectCore<T, E>>,
		}

		impl<T, E> Clone for $name<T, E> {
			fn clone(&self) -> Self {
				Self {
					core: self.core.clone(),
				}
			}
		}

		impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> $name<T, E> {
			/// Sends a raw event through the subject.
			pub fn send(&self, event: Event<T, E>) {
				self.core.send(event);
			}

			/// Sends a `next` event.
			pub fn send_next(&self, value: T) {
				self.send(Event::Next(value));
			}

			/// Sends a bare completion (`finished` or `failure(e)`).
			pub fn send_completion(&self, completion: Completion<E>) {
				self.send(completion.into_event());
			}

			/// Sends a value immediately followed by its completion.
			pub fn send_last(&self, value: T, completion: Completion<E>) {
				self.send_next(value);
				self.send_completion(completion);
			}

			/// Subscribes `observer`, per the guarded-observer contract.
			pub fn observe(&self, observer: impl Observer<T, E> + 'static) -> Disposable {
				self.core.observe(observer)
			}

			/// The number of currently-registered observers. Exposed for the
			/// ref-count layer and for diagnostics: wire your own sink to this
			/// instead of a built-in one.
			pub fn observer_count(&self) -> usize {
				self.core.observer_count()
			}

			/// Views this subject as a cold [`Signal`] so it can be composed
			/// with the operator library.
			pub fn as_signal(&self) -> Signal<T, E> {
				let core = self.core.clone();
				Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
					core.observe(MoveObserver(observer))
				})
			}
		}

		impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> MulticastBus<T, E>
			for $name<T, E>
		{
			fn send_event(&self, event: Event<T, E>) {
				self.send(event);
			}

			fn observe_event(&self, observer: Arc<dyn Observer<T, E>>) -> Disposable {
				self.observe(MoveObserver(observer))
			}
		}
	};
}

/// Uniform access to the three subject variants, so [`crate::Connectable`]
/// can be generic over which one backs a given `publish`/`replay`/`share`
/// call.
pub trait MulticastBus<T, E>: Clone + Send + Sync + 'static {
	fn send_event(&self, event: Event<T, E>);
	fn observe_event(&self, observer: Arc<dyn Observer<T, E>>) -> Disposable;
}

/// Adapts an already-`Arc`'d observer back into a plain [`Observer`] impl,
/// so it can be passed to APIs that take `impl Observer<T, E>` by value.
pub(crate) struct MoveObserver<T, E>(pub(crate) Arc<dyn Observer<T, E>>);
impl<T, E> Observer<T, E> for MoveObserver<T, E> {
	fn on_event(&self, event: Event<T, E>) {
		self.0.on_event(event);
	}
}

subject_variant!(
	PassthroughSubject,
	"No buffering: only observers present at emission time see a given event."
);
subject_variant!(
	ReplayOneSubject,
	"Stores the most recent non-terminal event and the terminal event independently."
);
subject_variant!(
	ReplaySubject,
	"Buffers the last N events (capped at N + 1 to retain a trailing terminal event)."
);

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> PassthroughSubject<T, E> {
	pub fn new() -> Self {
		Self {
			core: Arc::new(SubjectCore::new(Box::new(NoReplay))),
		}
	}
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> Default
	for PassthroughSubject<T, E>
{
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> ReplaySubject<T, E> {
	pub fn new(n: usize) -> Self {
		Self {
			core: Arc::new(SubjectCore::new(Box::new(ReplayN {
				capacity: n,
				buffer: std::collections::VecDeque::with_capacity(n + 1),
			}))),
		}
	}
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> ReplayOneSubject<T, E> {
	pub fn new() -> Self {
		Self {
			core: Arc::new(SubjectCore::new(Box::new(ReplayOne::default()))),
		}
	}
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> Default
	for ReplayOneSubject<T, E>
{
	fn default() -> Self {
		Self::new()
	}
}
