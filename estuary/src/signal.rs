use std::sync::Arc;
use std::time::Duration;

use estuary_core::{
	Disposable, Event, FlagDisposable, GuardedObserver, Never, Observer, Scheduler,
	SerialDisposable,
};

use crate::error::PanicError;

type Producer<T, E> = dyn Fn(Arc<dyn Observer<T, E>>) -> Disposable + Send + Sync;

/// A cold producer closure plus the `observe` entry point.
///
/// `Signal` is an immutable, cheaply-clonable description of a producer:
/// semantically a function from an observer to a [`Disposable`]. Calling
/// [`observe`](Signal::observe) creates a new, independent execution of the
/// producer; subscribers never share state.
pub struct Signal<T, E = Never> {
	producer: Arc<Producer<T, E>>,
}

impl<T, E> Clone for Signal<T, E> {
	fn clone(&self) -> Self {
		Self {
			producer: self.producer.clone(),
		}
	}
}

impl<T: 'static, E: 'static> Signal<T, E> {
	/// Builds a signal from its raw producer closure.
	///
	/// `f` receives the guarded observer for one subscription instance and
	/// returns the disposable that tears down whatever state it allocated
	/// (timers, inner subscriptions, bus registrations).
	pub fn from_producer(
		f: impl Fn(Arc<dyn Observer<T, E>>) -> Disposable + Send + Sync + 'static,
	) -> Self {
		Self {
			producer: Arc::new(f),
		}
	}

	/// Subscribes `observer`, wrapping it per the guarded-observer contract,
	/// and returns the outward-facing subscription handle. Disposing it both
	/// silences further delivery to `observer` and tears down the producer's
	/// own state.
	pub fn observe(&self, observer: impl Observer<T, E> + 'static) -> Disposable {
		let (guarded, subscription) = GuardedObserver::new(Arc::new(observer));
		let producer_disposable = (self.producer)(guarded.clone());
		guarded.add_child(producer_disposable);
		subscription
	}

	/// Subscribes a plain event callback; sugar over [`observe`](Signal::observe)
	/// for closures that don't need a named type.
	pub fn observe_fn(&self, f: impl Fn(Event<T, E>) + Send + Sync + 'static) -> Disposable {
		self.observe(f)
	}

	/// Subscribes separate `on_value`/`on_completion` callbacks.
	pub fn sink(
		&self,
		on_value: impl Fn(T) + Send + Sync + 'static,
		on_completion: impl Fn(estuary_core::Completion<E>) + Send + Sync + 'static,
	) -> Disposable {
		self.observe(move |event: Event<T, E>| match event {
			Event::Next(v) => on_value(v),
			Event::Completed => on_completion(estuary_core::Completion::Finished),
			Event::Failed(e) => on_completion(estuary_core::Completion::Failure(e)),
		})
	}

	/// Subscribes `on_completion` for `finished`/`failure(e)`.
	pub fn observe_completion(
		&self,
		on_completion: impl Fn(estuary_core::Completion<E>) + Send + Sync + 'static,
	) -> Disposable {
		self.observe(move |event: Event<T, E>| match event {
			Event::Next(_) => {}
			Event::Completed => on_completion(estuary_core::Completion::Finished),
			Event::Failed(e) => on_completion(estuary_core::Completion::Failure(e)),
		})
	}

	/// Runs `on_completed` only for the success terminal.
	pub fn observe_completed(&self, on_completed: impl Fn() + Send + Sync + 'static) -> Disposable {
		self.observe(move |event: Event<T, E>| {
			if let Event::Completed = event {
				on_completed();
			}
		})
	}

	/// Runs `on_failed` only for the failure terminal.
	pub fn observe_failed(&self, on_failed: impl Fn(E) + Send + Sync + 'static) -> Disposable {
		self.observe(move |event: Event<T, E>| {
			if let Event::Failed(e) = event {
				on_failed(e);
			}
		})
	}
}

impl<T: 'static> Signal<T, Never> {
	/// Subscribes a value-only callback; only available on infallible
	/// signals, since there is no `failed` case to ignore silently.
	pub fn observe_next(&self, f: impl Fn(T) + Send + Sync + 'static) -> Disposable {
		self.observe(move |event: Event<T, Never>| {
			if let Event::Next(v) = event {
				f(v);
			}
		})
	}

	/// Zero-cost re-labelling of an infallible signal's phantom error type;
	/// the explicit combinator a language without subtyping needs to widen
	/// `Never` into any other error type.
	pub fn cast_error<E: Send + 'static>(&self) -> Signal<T, E> {
		let producer = self.producer.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let adapter: Arc<dyn Observer<T, Never>> =
				Arc::new(move |event: Event<T, Never>| observer.on_event(event.cast_error()));
			producer(adapter)
		})
	}
}

// ---- Factories ----

impl<T: Clone + Send + 'static, E: Send + 'static> Signal<T, E> {
	/// Emits `v` then completes.
	pub fn just(v: T) -> Self {
		Self::from_producer(move |observer| {
			observer.on_event(Event::Next(v.clone()));
			observer.on_event(Event::Completed);
			Disposable::noop()
		})
	}

	/// Schedules one emission after `delay`, then completes.
	pub fn just_after(v: T, delay: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
		Self::from_producer(move |observer| {
			let v = v.clone();
			scheduler.schedule_after(
				delay,
				Box::new(move || {
					observer.on_event(Event::Next(v));
					observer.on_event(Event::Completed);
				}),
			)
		})
	}
}

impl<T: Send + 'static, E: Clone + Send + 'static> Signal<T, E> {
	/// A signal that fails with `e` immediately.
	pub fn error(e: E) -> Self {
		Self::from_producer(move |observer| {
			observer.on_event(Event::Failed(e.clone()));
			Disposable::noop()
		})
	}
}

impl<T: Send + 'static, E: Send + 'static> Signal<T, E> {
	/// A signal that never emits anything and is never disposed on its own.
	pub fn never() -> Self {
		Self::from_producer(|_observer| Disposable::noop())
	}

	/// A signal that either completes immediately or never emits, depending
	/// on `complete_immediately`.
	pub fn empty(complete_immediately: bool) -> Self {
		Self::from_producer(move |observer| {
			if complete_immediately {
				observer.on_event(Event::Completed);
			}
			Disposable::noop()
		})
	}

	/// A signal that completes immediately, emitting no values. Named
	/// separately from `empty` for the common case where the caller always
	/// wants the completing variant.
	pub fn completed() -> Self {
		Self::empty(true)
	}

	/// Synchronously drains a (possibly infinite) iterator, one item per
	/// `next`. Disposal between items halts the drain; driving a genuinely
	/// infinite iterator this way blocks the calling thread forever, so use
	/// [`sequence_interval`](Signal::sequence_interval) for those instead.
	pub fn sequence<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = T> + Clone + Send + 'static,
	{
		Self::from_producer(move |observer| {
			let disposable = Arc::new(FlagDisposable::new());
			let d = Disposable::from_arc(disposable.clone());
			for item in iter.clone() {
				if disposable.is_disposed() {
					return d;
				}
				observer.on_event(Event::Next(item));
			}
			if !disposable.is_disposed() {
				observer.on_event(Event::Completed);
			}
			d
		})
	}

	/// Emits one item per `dt`, driven by `scheduler`; disposal cancels the
	/// next scheduled emission.
	pub fn sequence_interval<I>(iter: I, dt: Duration, scheduler: Arc<dyn Scheduler>) -> Self
	where
		I: IntoIterator<Item = T> + Clone + Send + 'static,
		I::IntoIter: Send + 'static,
	{
		Self::from_producer(move |observer| {
			let serial = SerialDisposable::create();
			let boxed: Box<dyn Iterator<Item = T> + Send> = Box::new(iter.clone().into_iter());
			schedule_next_interval_item(boxed, dt, scheduler.clone(), observer, serial.clone());
			Disposable::from_arc(serial)
		})
	}

	/// Single-shot compute: runs `f` once per subscription and emits its
	/// result, then completes.
	pub fn from_closure(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
		Self::from_producer(move |observer| {
			observer.on_event(Event::Next(f()));
			observer.on_event(Event::Completed);
			Disposable::noop()
		})
	}

	/// Single-shot fallible compute.
	pub fn from_fallible(f: impl Fn() -> Result<T, E> + Send + Sync + 'static) -> Self {
		Self::from_producer(move |observer| {
			match f() {
				Ok(v) => {
					observer.on_event(Event::Next(v));
					observer.on_event(Event::Completed);
				}
				Err(e) => observer.on_event(Event::Failed(e)),
			}
			Disposable::noop()
		})
	}

	/// Lifts an already-computed `Result` straight to `next`+`completed` or
	/// `failed`, with no deferred call like `from_fallible`.
	pub fn from_result(r: Result<T, E>) -> Self
	where
		T: Clone,
		E: Clone,
	{
		match r {
			Ok(v) => Self::just(v),
			Err(e) => Self::error(e),
		}
	}

	/// Bridges a `Future` into a single-emission signal: emits the future's
	/// output then completes, or emits nothing if disposed first. Built on
	/// `futures-lite`'s race combinator and a `futures-channel` oneshot
	/// cancellation signal.
	pub fn future(future: impl std::future::Future<Output = T> + Send + 'static) -> Self {
		Self::from_producer(move |observer| {
			let (cancel_tx, cancel_rx) = futures_channel::oneshot::channel::<()>();
			std::thread::spawn(move || {
				let raced = futures_lite::future::or(
					async { Some(future.await) },
					async move {
						let _ = cancel_rx.await;
						None
					},
				);
				if let Some(value) = futures_lite::future::block_on(raced) {
					observer.on_event(Event::Next(value));
					observer.on_event(Event::Completed);
				}
			});
			estuary_core::BlockDisposable::create(move || {
				let _ = cancel_tx.send(());
			})
		})
	}
}

impl<T: Send + 'static, E: Send + 'static> Signal<T, E> {
	/// Resolves with the first `next` value, or the failure if the signal
	/// fails before emitting one; the subscription is disposed as soon as
	/// either happens.
	pub fn to_future(&self) -> impl std::future::Future<Output = Result<T, E>> + Send + 'static {
		let (tx, rx) = futures_channel::oneshot::channel::<Result<T, E>>();
		let tx = Arc::new(parking_lot::Mutex::new(Some(tx)));
		let subscription = self.observe(move |event: Event<T, E>| match event {
			Event::Next(v) => {
				if let Some(tx) = tx.lock().take() {
					let _ = tx.send(Ok(v));
				}
			}
			Event::Failed(e) => {
				if let Some(tx) = tx.lock().take() {
					let _ = tx.send(Err(e));
				}
			}
			Event::Completed => {}
		});
		async move {
			let result = rx.await.expect("signal completed without emitting a value");
			drop(subscription);
			result
		}
	}
}

impl<T: Clone + Send + 'static> Signal<T, PanicError> {
	/// Single-shot compute that converts a caught panic into a `failed`
	/// event, standing in for a typed `throws`.
	pub fn from_catching(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
		Self::from_producer(move |observer| {
			match std::panic::catch_unwind(std::panic::AssertUnwindSafe(&f)) {
				Ok(v) => {
					observer.on_event(Event::Next(v));
					observer.on_event(Event::Completed);
				}
				Err(payload) => observer.on_event(Event::Failed(PanicError(payload))),
			}
			Disposable::noop()
		})
	}
}

impl<T: Clone + Send + Sync + 'static, E: Send + 'static> Signal<T, E> {
	/// Rewrites `*slot` so that calling it pushes into the returned signal,
	/// bridging a legacy callback-based API. Emissions made through `*slot`
	/// before a given `observe` call are replayed to that subscriber first.
	pub fn from_callback_capture(slot: &mut Box<dyn FnMut(T) + Send>) -> Self {
		let state = Arc::new(CaptureState::<T, E>::default());
		let write = state.clone();
		*slot = Box::new(move |value: T| write.push(value));
		Self::from_producer(move |observer| state.subscribe(observer))
	}
}

struct CaptureState<T, E> {
	history: parking_lot::Mutex<Vec<T>>,
	observers: parking_lot::Mutex<Vec<(u64, Arc<dyn Observer<T, E>>)>>,
	next_token: std::sync::atomic::AtomicU64,
}

impl<T, E> Default for CaptureState<T, E> {
	fn default() -> Self {
		Self {
			history: parking_lot::Mutex::new(Vec::new()),
			observers: parking_lot::Mutex::new(Vec::new()),
			next_token: std::sync::atomic::AtomicU64::new(0),
		}
	}
}

impl<T: Clone + Send + Sync + 'static, E> CaptureState<T, E> {
	fn push(&self, value: T) {
		self.history.lock().push(value.clone());
		for (_, observer) in self.observers.lock().iter() {
			observer.on_event(Event::Next(value.clone()));
		}
	}

	fn subscribe(self: &Arc<Self>, observer: Arc<dyn Observer<T, E>>) -> Disposable {
		for value in self.history.lock().iter().cloned() {
			observer.on_event(Event::Next(value));
		}
		let token = self.next_token.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
		self.observers.lock().push((token, observer));
		let this = self.clone();
		estuary_core::BlockDisposable::create(move || {
			this.observers.lock().retain(|(t, _)| *t != token);
		})
	}
}

fn schedule_next_interval_item<T: Send + 'static, E: Send + 'static>(
	mut iter: Box<dyn Iterator<Item = T> + Send>,
	dt: Duration,
	scheduler: Arc<dyn Scheduler>,
	observer: Arc<dyn Observer<T, E>>,
	serial: Arc<SerialDisposable>,
) {
	match iter.next() {
		None => observer.on_event(Event::Completed),
		Some(item) => {
			let scheduler2 = scheduler.clone();
			let serial2 = serial.clone();
			let handle = scheduler.schedule_after(
				dt,
				Box::new(move || {
					observer.on_event(Event::Next(item));
					schedule_next_interval_item(iter, dt, scheduler2, observer, serial2);
				}),
			);
			serial.set(handle);
		}
	}
}
