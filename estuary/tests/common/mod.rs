//! Shared integration-test tooling: a recording sink plus a deterministic,
//! manually-driven scheduler so time-based scenarios don't depend on real
//! wall-clock sleeps.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use estuary::{Cancellable, Disposable, Scheduler};

/// Records every value/event handed to it, in delivery order.
pub struct Recorder<T> {
	events: Arc<Mutex<Vec<T>>>,
}

impl<T> Recorder<T> {
	pub fn new() -> Self {
		Self {
			events: Arc::new(Mutex::new(Vec::new())),
		}
	}

	pub fn push(&self, v: T) {
		self.events.lock().unwrap().push(v);
	}

	pub fn sink(&self) -> impl Fn(T) + Send + Sync + 'static
	where
		T: Send + Sync + 'static,
	{
		let events = self.events.clone();
		move |v: T| events.lock().unwrap().push(v)
	}

	pub fn snapshot(&self) -> Vec<T>
	where
		T: Clone,
	{
		self.events.lock().unwrap().clone()
	}
}

impl<T> Default for Recorder<T> {
	fn default() -> Self {
		Self::new()
	}
}

struct Entry {
	deadline: Duration,
	seq: u64,
	cancelled: Arc<AtomicBool>,
	thunk: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

struct CancelFlag(Arc<AtomicBool>);

impl Cancellable for CancelFlag {
	fn dispose(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	fn is_disposed(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// A `Scheduler` with no clock of its own: nothing scheduled via
/// `schedule_after` runs until [`ManualScheduler::advance`] is called.
pub struct ManualScheduler {
	now: Mutex<Duration>,
	queue: Mutex<Vec<Entry>>,
	next_seq: AtomicU64,
}

impl ManualScheduler {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			now: Mutex::new(Duration::ZERO),
			queue: Mutex::new(Vec::new()),
			next_seq: AtomicU64::new(0),
		})
	}

	pub fn advance(&self, by: Duration) {
		let target = {
			let mut now = self.now.lock().unwrap();
			*now += by;
			*now
		};
		loop {
			let next = {
				let mut queue = self.queue.lock().unwrap();
				queue.retain(|e| !e.cancelled.load(Ordering::SeqCst));
				let idx = queue
					.iter()
					.enumerate()
					.filter(|(_, e)| e.deadline <= target)
					.min_by_key(|(_, e)| (e.deadline, e.seq))
					.map(|(i, _)| i);
				idx.map(|i| queue.remove(i))
			};
			match next {
				Some(entry) => {
					if let Some(thunk) = entry.thunk.lock().unwrap().take() {
						thunk();
					}
				}
				None => break,
			}
		}
	}
}

impl Scheduler for ManualScheduler {
	fn schedule(&self, thunk: Box<dyn FnOnce() + Send>) {
		thunk();
	}

	fn schedule_after(&self, delay: Duration, thunk: Box<dyn FnOnce() + Send>) -> Disposable {
		let now = *self.now.lock().unwrap();
		let cancelled = Arc::new(AtomicBool::new(false));
		let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
		self.queue.lock().unwrap().push(Entry {
			deadline: now + delay,
			seq,
			cancelled: cancelled.clone(),
			thunk: Mutex::new(Some(thunk)),
		});
		Disposable::from_arc(Arc::new(CancelFlag(cancelled)))
	}
}
