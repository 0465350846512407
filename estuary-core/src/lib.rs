//! Runtime substrate for `estuary`: the event model, the disposable
//! hierarchy, the scheduler contract, and the guarded-observer invariants
//! every subscription obeys. No operators live here; see the `estuary`
//! crate for `Signal`, `Subject`, `Property` and the operator library built
//! on top of this.

mod disposable;
mod event;
mod observer;
mod scheduler;

pub use disposable::{
	BlockDisposable, Cancellable, CompositeDisposable, DeallocSignal, DeinitBound, Disposable,
	DisposeBag, FlagDisposable, SerialDisposable,
};
pub use event::{Completion, Event, Never};
pub use observer::{GuardedObserver, Observer};
pub use scheduler::{NonRecursiveScheduler, Scheduler};
