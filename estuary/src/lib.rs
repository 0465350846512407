//! `estuary`: a push-based, composable reactive-streams library.
//!
//! Built on top of `estuary-core`'s event model, disposable hierarchy and
//! guarded-observer contract, this crate supplies the public surface: the
//! cold [`Signal`] abstraction, the [`Subject`](subject) family and
//! [`Property`], the connect/ref-count layer in [`connectable`], the
//! operator library under [`operators`], and two-way [`binding`].

mod connectable;
mod error;
mod operators;
mod property;
mod signal;
mod subject;

#[cfg(test)]
pub(crate) mod tests_support;

pub mod binding;

pub use connectable::Connectable;
pub use error::{PanicError, TimeoutError};
pub use operators::FlattenStrategy;
pub use property::Property;
pub use signal::Signal;
pub use subject::{PassthroughSubject, ReplayOneSubject, ReplaySubject};

pub use estuary_core::{
	BlockDisposable, Cancellable, Completion, CompositeDisposable, DeinitBound, Disposable,
	DisposeBag, Event, FlagDisposable, NonRecursiveScheduler, Observer, Scheduler, SerialDisposable,
};
pub use estuary_core::Never;
