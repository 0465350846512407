use std::fmt::{self, Debug, Formatter};

/// The synthetic failure [`Signal::timeout_after`](crate::Signal::timeout_after)
/// emits when no `next` arrives within the deadline, for callers who don't
/// want to supply their own error value to the general `timeout` operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutError;

impl fmt::Display for TimeoutError {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str("signal timed out")
	}
}

impl std::error::Error for TimeoutError {}

/// The catch-all error kind `from_catching` needs to stand in for typed
/// `throws`: wraps whatever payload a caught panic carried.
pub struct PanicError(pub Box<dyn std::any::Any + Send>);

impl Debug for PanicError {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let message = self
			.0
			.downcast_ref::<&str>()
			.copied()
			.or_else(|| self.0.downcast_ref::<String>().map(String::as_str));
		match message {
			Some(message) => write!(f, "PanicError({message:?})"),
			None => f.write_str("PanicError(..)"),
		}
	}
}

impl fmt::Display for PanicError {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		Debug::fmt(self, f)
	}
}

impl std::error::Error for PanicError {}
