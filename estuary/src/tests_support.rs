//! Test-only scheduler: `estuary-core` defines only the `Scheduler`
//! contract (concrete schedulers are platform glue, out of scope for this
//! crate), so operator unit tests need a minimal stand-in. This one
//! runs nothing until [`ManualScheduler::advance`] is called, keeping
//! debounce/throttle/sample/delay/timeout tests deterministic instead of
//! racing real wall-clock sleeps.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use estuary_core::{Cancellable, Disposable, Scheduler};
use parking_lot::Mutex;

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

	/// Moves virtual time forward by `by`, running every due, uncancelled
	/// thunk in deadline order (ties broken by schedule order).
	pub fn advance(&self, by: Duration) {
		let target = {
			let mut now = self.now.lock();
			*now += by;
			*now
		};
		loop {
			let next = {
				let mut queue = self.queue.lock();
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
					if let Some(thunk) = entry.thunk.lock().take() {
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
		let now = *self.now.lock();
		let cancelled = Arc::new(AtomicBool::new(false));
		let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
		self.queue.lock().push(Entry {
			deadline: now + delay,
			seq,
			cancelled: cancelled.clone(),
			thunk: Mutex::new(Some(thunk)),
		});
		Disposable::from_arc(Arc::new(CancelFlag(cancelled)))
	}
}
