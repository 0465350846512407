//! End-to-end scenarios, literal inputs to literal outputs.

mod common;

use std::sync::Arc;
use std::time::Duration;

use estuary::{Completion, Event, FlattenStrategy, Never, PassthroughSubject, ReplaySubject, Signal};

use common::{ManualScheduler, Recorder};

fn collect<T: Clone + Send + Sync + 'static>(s: &Signal<T, Never>) -> Vec<T> {
	let recorder = Recorder::new();
	let sink = recorder.sink();
	let _subscription = s.observe_next(sink);
	recorder.snapshot()
}

#[test]
fn scenario_1_map_then_filter() {
	let result = collect(
		&Signal::<i32, Never>::sequence(vec![1, 2, 3])
			.map(|x| x * 2)
			.filter(|x| *x > 2),
	);
	assert_eq!(result, vec![4, 6]);
}

#[test]
fn scenario_2_scan_then_reduce() {
	let scanned = collect(&Signal::<i32, Never>::sequence(vec![1, 2, 3]).scan(0, |acc, x| acc + x));
	assert_eq!(scanned, vec![0, 1, 3, 6]);

	let reduced = collect(&Signal::<i32, Never>::sequence(vec![1, 2, 3]).reduce(0, |acc, x| acc + x));
	assert_eq!(reduced, vec![6]);
}

#[test]
fn scenario_3_passthrough_subject_only_sees_events_after_subscribing() {
	let subject = PassthroughSubject::<i32, Never>::new();
	let a = Recorder::new();
	let _a_sub = subject.observe(a.sink());
	subject.send_next(1);
	let b = Recorder::new();
	let _b_sub = subject.observe(b.sink());
	subject.send_next(2);
	subject.send_completion(Completion::Finished);

	assert_eq!(a.snapshot(), vec![Event::Next(1), Event::Next(2), Event::Completed]);
	assert_eq!(b.snapshot(), vec![Event::Next(2), Event::Completed]);
}

#[test]
fn scenario_4_replay_n_buffers_the_last_n_for_late_subscribers() {
	let subject = ReplaySubject::<i32, Never>::new(2);
	subject.send_next(1);
	subject.send_next(2);
	subject.send_next(3);

	let late = Recorder::new();
	let _sub = subject.observe(late.sink());
	subject.send_next(4);
	subject.send_completion(Completion::Finished);

	assert_eq!(
		late.snapshot(),
		vec![Event::Next(2), Event::Next(3), Event::Next(4), Event::Completed]
	);
}

#[test]
fn scenario_5_zip_emits_pairwise_sums() {
	let a = Signal::<i32, Never>::sequence(vec![1, 2, 3]);
	let b = Signal::<i32, Never>::sequence(vec![10, 20]);
	assert_eq!(collect(&a.zip(b, |x, y| x + y)), vec![11, 22]);
}

#[test]
fn scenario_6_combine_latest_formats_interleaved_emissions() {
	let a = PassthroughSubject::<i32, Never>::new();
	let b = PassthroughSubject::<String, Never>::new();
	let combined = a
		.as_signal()
		.combine_latest(b.as_signal(), |x: i32, y: String| format!("{x}{y}"));
	let out = Recorder::new();
	let _sub = combined.observe_next(out.sink());

	a.send_next(1);
	b.send_next("A".to_string());
	b.send_next("B".to_string());
	a.send_next(2);
	a.send_next(3);
	b.send_next("C".to_string());

	assert_eq!(
		out.snapshot(),
		vec![
			"1A".to_string(),
			"1B".to_string(),
			"2B".to_string(),
			"3B".to_string(),
			"3C".to_string(),
		]
	);
}

#[test]
fn scenario_7_amb_follows_whichever_side_emits_first() {
	let scheduler = ManualScheduler::new();
	let slow = Signal::<i32, Never>::sequence_interval(vec![1, 2], Duration::from_millis(100), scheduler.clone());
	let fast = Signal::<i32, Never>::sequence_interval(vec![3, 4], Duration::from_millis(10), scheduler.clone());

	let out = Recorder::new();
	let _sub = slow.amb(fast).observe_next(out.sink());
	scheduler.advance(Duration::from_millis(100));

	assert_eq!(out.snapshot(), vec![3, 4]);
}

#[test]
fn scenario_8_property_delivers_initial_value_then_updates() {
	let prop = estuary::Property::new(0);
	let out = Recorder::new();
	let _sub = prop.as_signal().observe_next(out.sink());
	prop.set(5);
	prop.set(7);
	assert_eq!(out.snapshot(), vec![0, 5, 7]);
}

#[test]
fn scenario_9_flat_map_latest_keeps_only_the_most_recent_inner_signal() {
	let scheduler = ManualScheduler::new();
	let out = Recorder::new();
	let sink = out.sink();
	let scheduler_for_inner = scheduler.clone();
	let _sub = Signal::<i32, Never>::sequence(vec![1, 2, 3, 4, 5])
		.flat_map(FlattenStrategy::Latest, move |n| {
			Signal::<(), Never>::sequence_interval(
				std::iter::repeat(()).take(3),
				Duration::from_millis(10),
				scheduler_for_inner.clone(),
			)
			.prefix(3)
			.map(move |_| n)
		})
		.observe_next(sink);

	scheduler.advance(Duration::from_millis(10));
	scheduler.advance(Duration::from_millis(10));
	scheduler.advance(Duration::from_millis(10));

	assert_eq!(out.snapshot(), vec![5, 5, 5]);
}

#[test]
fn scenario_materialize_round_trips() {
	let original = Signal::<i32, Never>::sequence(vec![1, 2, 3]);
	let direct = Recorder::new();
	let _d_sub = original.observe(direct.sink());

	let round_tripped = original.materialize().dematerialize();
	let via_round_trip = Recorder::new();
	let _r_sub = round_tripped.observe(via_round_trip.sink());

	assert_eq!(direct.snapshot(), via_round_trip.snapshot());
}

#[test]
fn scenario_merge_is_a_multiset_union_of_finite_sources() {
	let a = Signal::<i32, Never>::sequence(vec![1, 2]);
	let b = Signal::<i32, Never>::sequence(vec![3, 4]);
	let mut values = collect(&a.merge(b));
	values.sort_unstable();
	assert_eq!(values, vec![1, 2, 3, 4]);
}

#[test]
fn scenario_append_is_concat_ordering_and_skips_b_on_failure() {
	let a = Signal::<i32, Never>::sequence(vec![1, 2]);
	let b = Signal::<i32, Never>::sequence(vec![3, 4]);
	assert_eq!(collect(&a.append_signal(b)), vec![1, 2, 3, 4]);
}

#[test]
fn scenario_debounce_emits_only_after_quiescence() {
	let scheduler = ManualScheduler::new();
	let bus = PassthroughSubject::<i32, Never>::new();
	let debounced = bus.as_signal().debounce(Duration::from_millis(10), scheduler.clone());
	let out = Recorder::new();
	let _sub = debounced.observe_next(out.sink());

	bus.send_next(1);
	bus.send_next(2);
	bus.send_next(3);
	scheduler.advance(Duration::from_millis(10));

	assert_eq!(out.snapshot(), vec![3]);
}
