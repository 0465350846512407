use std::sync::Arc;

use estuary_core::{Disposable, Event, Observer};
use parking_lot::Mutex;

use crate::signal::Signal;

impl<T: Send + Sync + 'static, E: Send + Sync + 'static> Signal<T, E> {
	/// Forwards `next(f(x))`; terminals pass through unchanged.
	pub fn map<U: Send + Sync + 'static>(
		&self,
		f: impl Fn(T) -> U + Send + Sync + 'static,
	) -> Signal<U, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<U, E>>| {
			upstream.observe(move |event: Event<T, E>| observer.on_event(event.map(&f)))
		})
	}

	/// Forwards only `next(x)` for which `p(x)` holds; terminals pass
	/// through.
	pub fn filter(&self, p: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			upstream.observe(move |event: Event<T, E>| match &event {
				Event::Next(v) if !p(v) => {}
				_ => observer.on_event(event),
			})
		})
	}

	/// Forwards `next(x)` for every `f(x) = Some(x)`, drops the `None`s.
	pub fn compact_map<U: Send + Sync + 'static>(
		&self,
		f: impl Fn(T) -> Option<U> + Send + Sync + 'static,
	) -> Signal<U, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<U, E>>| {
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					if let Some(mapped) = f(v) {
						observer.on_event(Event::Next(mapped));
					}
				}
				Event::Failed(e) => observer.on_event(Event::Failed(e)),
				Event::Completed => observer.on_event(Event::Completed),
			})
		})
	}

	/// Emits `init` immediately, then `g(acc, x)` for each subsequent
	/// `next`; the accumulator is subscription-local.
	pub fn scan<Acc: Clone + Send + Sync + 'static>(
		&self,
		init: Acc,
		g: impl Fn(&Acc, T) -> Acc + Send + Sync + 'static,
	) -> Signal<Acc, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<Acc, E>>| {
			let acc = Arc::new(Mutex::new(init.clone()));
			observer.on_event(Event::Next(init.clone()));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let mut guard = acc.lock();
					*guard = g(&guard, v);
					observer.on_event(Event::Next(guard.clone()));
				}
				Event::Failed(e) => observer.on_event(Event::Failed(e)),
				Event::Completed => observer.on_event(Event::Completed),
			})
		})
	}

	/// `scan(init, g).last()`.
	pub fn reduce<Acc: Clone + Send + Sync + 'static>(
		&self,
		init: Acc,
		g: impl Fn(&Acc, T) -> Acc + Send + Sync + 'static,
	) -> Signal<Acc, E> {
		self.scan(init, g).last()
	}

	/// Emits `v` before anything from `self`.
	pub fn prepend(&self, v: T) -> Signal<T, E>
	where
		T: Clone,
	{
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			observer.on_event(Event::Next(v.clone()));
			upstream.observe(move |event: Event<T, E>| observer.on_event(event))
		})
	}

	/// Alias for [`prepend`](Signal::prepend): both names refer to the
	/// same combinator.
	pub fn start_with(&self, v: T) -> Signal<T, E>
	where
		T: Clone,
	{
		self.prepend(v)
	}

	/// Emits `v` right before `self`'s terminal event, once `self`
	/// completes successfully.
	pub fn append(&self, v: T) -> Signal<T, E>
	where
		T: Clone,
	{
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			let v = v.clone();
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Completed => {
					observer.on_event(Event::Next(v.clone()));
					observer.on_event(Event::Completed);
				}
				other => observer.on_event(other),
			})
		})
	}

	/// Accumulates `n` elements and emits them as a `Vec`, then clears.
	/// A partial, under-full buffer is *not* emitted at completion. On
	/// failure the partial buffer is discarded.
	pub fn buffer(&self, n: usize) -> Signal<Vec<T>, E>
	where
		T: Clone,
	{
		assert!(n > 0, "buffer size must be positive");
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<Vec<T>, E>>| {
			let pending = Arc::new(Mutex::new(Vec::with_capacity(n)));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let mut guard = pending.lock();
					guard.push(v);
					if guard.len() == n {
						let batch = std::mem::replace(&mut *guard, Vec::with_capacity(n));
						drop(guard);
						observer.on_event(Event::Next(batch));
					}
				}
				Event::Failed(e) => observer.on_event(Event::Failed(e)),
				Event::Completed => observer.on_event(Event::Completed),
			})
		})
	}

	/// Partitions `self` into a signal of finite inner signals of at most
	/// `n` elements each.
	///
	/// Each inner signal is hot: it starts emitting as soon as it is
	/// produced, not once its subscriber attaches, mirroring the source
	/// family's windowing behaviour.
	pub fn window(&self, n: usize) -> Signal<crate::Signal<T, estuary_core::Never>, E>
	where
		T: Clone,
		E: Clone,
	{
		assert!(n > 0, "window size must be positive");
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<crate::Signal<T, estuary_core::Never>, E>>| {
			let current: Arc<Mutex<Option<(crate::PassthroughSubject<T, estuary_core::Never>, usize)>>> =
				Arc::new(Mutex::new(None));
			upstream.observe(move |event: Event<T, E>| {
				match event {
					Event::Next(v) => {
						let mut guard = current.lock();
						if guard.is_none() {
							let subject = crate::PassthroughSubject::new();
							observer.on_event(Event::Next(subject.as_signal()));
							*guard = Some((subject, 0));
						}
						let done = {
							let (subject, count) = guard.as_mut().unwrap();
							subject.send_next(v);
							*count += 1;
							if *count == n {
								subject.send_completion(estuary_core::Completion::Finished);
								true
							} else {
								false
							}
						};
						if done {
							*guard = None;
						}
					}
					Event::Completed => {
						if let Some((subject, _)) = current.lock().take() {
							subject.send_completion(estuary_core::Completion::Finished);
						}
						observer.on_event(Event::Completed);
					}
					Event::Failed(e) => {
						if let Some((subject, _)) = current.lock().take() {
							subject.send_completion(estuary_core::Completion::Finished);
						}
						observer.on_event(Event::Failed(e));
					}
				}
			})
		})
	}

	/// Emits `(prev, curr)` pairs starting from the second element.
	pub fn pairwise(&self) -> Signal<(T, T), E>
	where
		T: Clone,
	{
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<(T, T), E>>| {
			let prev: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let mut guard = prev.lock();
					if let Some(p) = guard.replace(v.clone()) {
						observer.on_event(Event::Next((p, v)));
					}
				}
				Event::Failed(e) => observer.on_event(Event::Failed(e)),
				Event::Completed => observer.on_event(Event::Completed),
			})
		})
	}

	/// Like [`pairwise`](Signal::pairwise) but starts with `(None, first)`
	/// instead of skipping the first element.
	pub fn zip_previous(&self) -> Signal<(Option<T>, T), E>
	where
		T: Clone,
	{
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<(Option<T>, T), E>>| {
			let prev: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
			upstream.observe(move |event: Event<T, E>| match event {
				Event::Next(v) => {
					let mut guard = prev.lock();
					let p = guard.replace(v.clone());
					observer.on_event(Event::Next((p, v)));
				}
				Event::Failed(e) => observer.on_event(Event::Failed(e)),
				Event::Completed => observer.on_event(Event::Completed),
			})
		})
	}

	/// Lifts every event (including terminals) to a plain value, ending the
	/// outer signal with `completed` once the lifted terminal has been
	/// delivered.
	pub fn materialize(&self) -> Signal<Event<T, E>, estuary_core::Never>
	where
		T: Clone,
		E: Clone,
	{
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<Event<T, E>, estuary_core::Never>>| {
			upstream.observe(move |event: Event<T, E>| {
				let terminal = event.is_terminal();
				observer.on_event(Event::Next(event));
				if terminal {
					observer.on_event(Event::Completed);
				}
			})
		})
	}

	/// Maps every `next` to `()`, discarding the payload while preserving
	/// terminals.
	pub fn erase_type(&self) -> Signal<(), E> {
		self.map(|_| ())
	}
}

impl<T: Clone + Send + Sync + 'static, E: Clone + Send + Sync + 'static> Signal<Event<T, E>, estuary_core::Never> {
	/// The inverse of [`materialize`](Signal::materialize): lowers lifted
	/// events back onto the event channel itself.
	///
	/// `s.materialize().dematerialize()` reproduces `s`'s event sequence
	/// exactly.
	pub fn dematerialize(&self) -> Signal<T, E> {
		let upstream = self.clone();
		Signal::from_producer(move |observer: Arc<dyn Observer<T, E>>| {
			upstream.observe(move |event: Event<Event<T, E>, estuary_core::Never>| {
				if let Event::Next(inner) = event {
					observer.on_event(inner);
				}
			})
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use estuary_core::Never;

	fn to_vec<T: Clone + Send + Sync + 'static>(s: &Signal<T, Never>) -> Vec<T> {
		let out = Arc::new(Mutex::new(Vec::new()));
		let o = out.clone();
		s.observe_next(move |v| o.lock().push(v));
		out.lock().clone()
	}

	#[test]
	fn map_then_filter() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3])
			.map(|x| x * 2)
			.filter(|x| *x > 2);
		assert_eq!(to_vec(&s), vec![4, 6]);
	}

	#[test]
	fn scan_emits_init_then_running_total() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3]).scan(0, |acc, x| acc + x);
		assert_eq!(to_vec(&s), vec![0, 1, 3, 6]);
	}

	#[test]
	fn reduce_emits_only_final() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3]).reduce(0, |acc, x| acc + x);
		assert_eq!(to_vec(&s), vec![6]);
	}

	#[test]
	fn buffer_drops_partial_tail() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3, 4, 5]).buffer(2);
		assert_eq!(to_vec(&s), vec![vec![1, 2], vec![3, 4]]);
	}

	#[test]
	fn pairwise_skips_first_element() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3]).pairwise();
		assert_eq!(to_vec(&s), vec![(1, 2), (2, 3)]);
	}

	#[test]
	fn zip_previous_starts_with_none() {
		let s = Signal::<i32, Never>::sequence(vec![1, 2, 3]).zip_previous();
		assert_eq!(to_vec(&s), vec![(None, 1), (Some(1), 2), (Some(2), 3)]);
	}

	#[test]
	fn materialize_dematerialize_round_trips() {
		let original = Signal::<i32, Never>::sequence(vec![1, 2, 3]);
		let events_a = Arc::new(Mutex::new(Vec::new()));
		let ea = events_a.clone();
		original.observe(move |e: Event<i32, Never>| ea.lock().push(e));

		let round_tripped = original.materialize().dematerialize();
		let events_b = Arc::new(Mutex::new(Vec::new()));
		let eb = events_b.clone();
		round_tripped.observe(move |e: Event<i32, Never>| eb.lock().push(e));

		assert_eq!(*events_a.lock(), *events_b.lock());
	}
}
