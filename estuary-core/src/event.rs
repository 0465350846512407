use std::fmt::{self, Debug, Formatter};

/// An uninhabited error type marking a signal that statically cannot fail.
///
/// `Never` has no values, so a function returning `Result<T, Never>` can
/// only ever return `Ok`. Operators widen a `Never`-typed signal into any
/// `E`-typed one for free via [`Event::cast_error`].
#[derive(Clone, Copy)]
pub enum Never {}

impl Debug for Never {
	fn fmt(&self, _f: &mut Formatter<'_>) -> fmt::Result {
		match *self {}
	}
}

impl fmt::Display for Never {
	fn fmt(&self, _f: &mut Formatter<'_>) -> fmt::Result {
		match *self {}
	}
}

impl std::error::Error for Never {}

/// One emission of a [`Signal`](trait@crate::Signal): a value, a typed
/// failure, or orderly completion.
///
/// `next` is non-terminal; `failed` and `completed` are terminal and close
/// the subscription that observed them (see the guarded-observer contract).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event<T, E> {
	Next(T),
	Failed(E),
	Completed,
}

impl<T, E> Event<T, E> {
	/// Whether this event closes the subscription it occurs on.
	#[inline]
	pub fn is_terminal(&self) -> bool {
		matches!(self, Event::Failed(_) | Event::Completed)
	}

	#[inline]
	pub fn is_next(&self) -> bool {
		matches!(self, Event::Next(_))
	}

	#[inline]
	pub fn value(&self) -> Option<&T> {
		match self {
			Event::Next(v) => Some(v),
			_ => None,
		}
	}

	#[inline]
	pub fn into_value(self) -> Option<T> {
		match self {
			Event::Next(v) => Some(v),
			_ => None,
		}
	}

	#[inline]
	pub fn error(&self) -> Option<&E> {
		match self {
			Event::Failed(e) => Some(e),
			_ => None,
		}
	}

	#[inline]
	pub fn into_error(self) -> Option<E> {
		match self {
			Event::Failed(e) => Some(e),
			_ => None,
		}
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U, E> {
		match self {
			Event::Next(v) => Event::Next(f(v)),
			Event::Failed(e) => Event::Failed(e),
			Event::Completed => Event::Completed,
		}
	}

	pub fn map_error<F>(self, f: impl FnOnce(E) -> F) -> Event<T, F> {
		match self {
			Event::Next(v) => Event::Next(v),
			Event::Failed(e) => Event::Failed(f(e)),
			Event::Completed => Event::Completed,
		}
	}
}

impl<T> Event<T, Never> {
	/// Zero-cost re-labelling of an infallible event's phantom error type.
	///
	/// `Never` has no values, so this can never actually construct a
	/// `Failed` variant; it only relaxes the type the compiler tracks.
	pub fn cast_error<E>(self) -> Event<T, E> {
		match self {
			Event::Next(v) => Event::Next(v),
			Event::Failed(never) => match never {},
			Event::Completed => Event::Completed,
		}
	}
}

impl<T: Debug, E: Debug> Debug for Event<T, E> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Event::Next(v) => f.debug_tuple("Next").field(v).finish(),
			Event::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
			Event::Completed => f.write_str("Completed"),
		}
	}
}

/// The two ways a signal can end, independent of any carried value; used
/// by `Subject::send` overloads that take a bare completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion<E> {
	Finished,
	Failure(E),
}

impl<E> Completion<E> {
	pub fn into_event<T>(self) -> Event<T, E> {
		match self {
			Completion::Finished => Event::Completed,
			Completion::Failure(e) => Event::Failed(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn is_terminal() {
		assert!(!Event::<i32, ()>::Next(1).is_terminal());
		assert!(Event::<i32, ()>::Failed(()).is_terminal());
		assert!(Event::<i32, ()>::Completed.is_terminal());
	}

	#[test]
	fn cast_error_is_transparent() {
		let e: Event<i32, Never> = Event::Next(5);
		assert_eq!(e.cast_error::<&str>().into_value(), Some(5));
	}
}
