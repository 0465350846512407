use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared behaviour every disposable variant implements.
///
/// `dispose` must be idempotent and `is_disposed` monotonic: once it
/// reports `true` it never again reports `false`.
pub trait Cancellable: Send + Sync {
	fn dispose(&self);
	fn is_disposed(&self) -> bool;
}

/// A type-erased, cheaply-clonable cancellation handle.
///
/// Callers never match on which concrete variant they hold, they just call
/// [`dispose`](Disposable::dispose).
#[derive(Clone)]
pub struct Disposable(Arc<dyn Cancellable>);

impl Disposable {
	pub fn from_arc(inner: Arc<dyn Cancellable>) -> Self {
		Self(inner)
	}

	/// A disposable that can never be disposed; used by producers with
	/// nothing to tear down (e.g. `just`, `empty`).
	pub fn noop() -> Self {
		Self(Arc::new(NoopDisposable))
	}

	pub fn dispose(&self) {
		self.0.dispose();
	}

	pub fn is_disposed(&self) -> bool {
		self.0.is_disposed()
	}
}

impl std::fmt::Debug for Disposable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Disposable")
			.field("is_disposed", &self.is_disposed())
			.finish()
	}
}

struct NoopDisposable;

impl Cancellable for NoopDisposable {
	fn dispose(&self) {}
	fn is_disposed(&self) -> bool {
		false
	}
}

/// A bare atomic-boolean disposable: no teardown action, just a flag other
/// code can check and flip. Used internally by the guarded observer.
pub struct FlagDisposable(AtomicBool);

impl FlagDisposable {
	pub fn new() -> Self {
		Self(AtomicBool::new(false))
	}
}

impl Default for FlagDisposable {
	fn default() -> Self {
		Self::new()
	}
}

impl Cancellable for FlagDisposable {
	fn dispose(&self) {
		self.0.store(true, Ordering::SeqCst);
	}
	fn is_disposed(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Runs a thunk exactly once, on first dispose.
pub struct BlockDisposable(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl BlockDisposable {
	pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
		Self(Mutex::new(Some(Box::new(action))))
	}

	pub fn create(action: impl FnOnce() + Send + 'static) -> Disposable {
		Disposable(Arc::new(Self::new(action)))
	}
}

impl Cancellable for BlockDisposable {
	fn dispose(&self) {
		let action = self.0.lock().take();
		if let Some(action) = action {
			action();
		}
	}

	fn is_disposed(&self) -> bool {
		self.0.lock().is_none()
	}
}

/// Holds one swappable inner disposable.
///
/// Swapping disposes the previously-held inner disposable. If `self` has
/// already been disposed, any disposable subsequently assigned via
/// [`set`](SerialDisposable::set) is disposed immediately instead of being
/// retained.
pub struct SerialDisposable {
	inner: Mutex<Option<Disposable>>,
	disposed: AtomicBool,
}

impl SerialDisposable {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(None),
			disposed: AtomicBool::new(false),
		}
	}

	pub fn create() -> Arc<Self> {
		Arc::new(Self::new())
	}

	/// Swaps in `new`, disposing whatever was previously held. Returns `new`
	/// unchanged so call sites can chain.
	pub fn set(&self, new: Disposable) {
		if self.disposed.load(Ordering::SeqCst) {
			new.dispose();
			return;
		}
		let old = self.inner.lock().replace(new);
		if let Some(old) = old {
			old.dispose();
		}
	}

	pub fn get(&self) -> Option<Disposable> {
		self.inner.lock().clone()
	}
}

impl Default for SerialDisposable {
	fn default() -> Self {
		Self::new()
	}
}

impl Cancellable for SerialDisposable {
	fn dispose(&self) {
		self.disposed.store(true, Ordering::SeqCst);
		let old = self.inner.lock().take();
		if let Some(old) = old {
			old.dispose();
		}
	}

	fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}
}

/// An ordered collection of disposables, all disposed together.
///
/// Children added after `self` is disposed are disposed immediately
/// instead of being retained.
pub struct CompositeDisposable {
	children: Mutex<Vec<Disposable>>,
	disposed: AtomicBool,
}

impl CompositeDisposable {
	pub fn new() -> Self {
		Self {
			children: Mutex::new(Vec::new()),
			disposed: AtomicBool::new(false),
		}
	}

	pub fn create() -> Arc<Self> {
		Arc::new(Self::new())
	}

	pub fn add(&self, d: Disposable) {
		if self.disposed.load(Ordering::SeqCst) {
			d.dispose();
			return;
		}
		let mut children = self.children.lock();
		children.retain(|c| !c.is_disposed());
		children.push(d);
	}

	/// Removes (without disposing) a previously-added disposable, identified
	/// by pointer equality with the handle returned from `add`.
	pub fn remove(&self, d: &Disposable) {
		let mut children = self.children.lock();
		children.retain(|c| !Arc::ptr_eq(&c.0, &d.0));
	}
}

impl Default for CompositeDisposable {
	fn default() -> Self {
		Self::new()
	}
}

impl Cancellable for CompositeDisposable {
	fn dispose(&self) {
		self.disposed.store(true, Ordering::SeqCst);
		// Keep the children behind the guard for the whole drain: if one
		// child's dispose() panics, the guard's drop still disposes whatever
		// is left in the vec instead of abandoning it mid-unwind.
		let mut children = scopeguard::guard(Vec::new(), |leftover: Vec<Disposable>| {
			for child in leftover {
				child.dispose();
			}
		});
		std::mem::swap(&mut *children, &mut self.children.lock());
		while let Some(child) = children.pop() {
			child.dispose();
		}
	}

	fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}
}

/// Disposes its wrapped handle when dropped.
///
/// Use this to tie a subscription's lifetime to a Rust value's scope
/// instead of an explicit `dispose()` call.
pub struct DeinitBound(Disposable);

impl DeinitBound {
	pub fn new(inner: Disposable) -> Self {
		Self(inner)
	}

	pub fn disposable(&self) -> Disposable {
		self.0.clone()
	}
}

impl Drop for DeinitBound {
	fn drop(&mut self) {
		self.0.dispose();
	}
}

/// A minimal, dependency-free broadcaster used only for
/// [`DisposeBag::deallocated`]; fires [`Completed`](crate::event::Event::Completed)
/// exactly once, to every observer registered before the fire.
///
/// Kept separate from the full `Subject` hierarchy (which lives in the
/// `estuary` crate, above this one) so that `estuary-core` has no upward
/// dependency.
#[derive(Default)]
pub struct DeallocSignal {
	observers: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
	fired: AtomicBool,
}

impl DeallocSignal {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&self, observer: Arc<dyn Fn() + Send + Sync>) {
		if self.fired.load(Ordering::SeqCst) {
			observer();
			return;
		}
		self.observers.lock().push(observer);
	}

	pub fn fire(&self) {
		if self.fired.swap(true, Ordering::SeqCst) {
			return;
		}
		let observers = std::mem::take(&mut *self.observers.lock());
		for observer in observers {
			observer();
		}
	}
}

/// An owned collection of disposables, disposed together on drop.
///
/// Disposes every held disposable in insertion order on drop, then clears,
/// and exposes a `deallocated` signal that fires once the bag itself is
/// torn down.
pub struct DisposeBag {
	composite: Arc<CompositeDisposable>,
	deallocated: Arc<DeallocSignal>,
}

impl DisposeBag {
	pub fn new() -> Self {
		Self {
			composite: CompositeDisposable::create(),
			deallocated: Arc::new(DeallocSignal::new()),
		}
	}

	pub fn insert(&self, d: Disposable) {
		self.composite.add(d);
	}

	pub fn remove(&self, d: &Disposable) {
		self.composite.remove(d);
	}

	/// A signal-like hook, firing once, that other code can subscribe to in
	/// order to run cleanup exactly when this bag is dropped.
	pub fn deallocated(&self) -> Arc<DeallocSignal> {
		self.deallocated.clone()
	}
}

impl Default for DisposeBag {
	fn default() -> Self {
		Self::new()
	}
}

impl std::ops::Add<Disposable> for &DisposeBag {
	type Output = ();

	fn add(self, rhs: Disposable) {
		self.insert(rhs);
	}
}

impl Drop for DisposeBag {
	fn drop(&mut self) {
		self.composite.dispose();
		self.deallocated.fire();
	}
}
