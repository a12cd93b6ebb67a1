use std::time::Duration;

use sluice::{
    DataSource, MapOptions, MapPhase, MapSource, list_source::ListSource, pipeline,
};
use sluice_common::ErrorKind;
use sluice_tape::Tape;
use sluice_testkit::{
    sources::{CountingSource, drain, take},
    tapes::persist_and_reload,
    transforms::{fail_on, jittered},
};

fn square(x: i64) -> sluice_common::Result<Option<i64>> {
    Ok((x % 5 != 0).then_some(x * x))
}

fn deterministic(num_parallel_calls: usize) -> MapOptions {
    MapOptions::default().with_num_parallel_calls(num_parallel_calls)
}

fn asynchronous(num_parallel_calls: usize) -> MapOptions {
    MapOptions::default()
        .with_num_parallel_calls(num_parallel_calls)
        .with_deterministic(false)
}

#[test]
fn test_deterministic_round_trip_on_fresh_instance() {
    let input: Vec<i64> = (1..=23).collect();
    for num_parallel_calls in [1, 2, 4] {
        // Consuming 0, 1, ... elements leaves every possible number of buffered
        // results behind, from none up to a full batch.
        for consumed in 0..=2 * num_parallel_calls + 1 {
            let mut original =
                MapSource::from_fn(ListSource::new(input.clone()), square, deterministic(num_parallel_calls))
                    .unwrap();
            take(&mut original, consumed).unwrap();

            let mut tape = Tape::new();
            original.record_position(&mut tape, true).unwrap();
            let expected = drain(&mut original).unwrap();

            let mut tape = persist_and_reload(&tape).unwrap();
            let mut restored =
                MapSource::from_fn(ListSource::new(input.clone()), square, deterministic(num_parallel_calls))
                    .unwrap();
            restored.reload_position(&mut tape, true).unwrap();
            assert!(tape.is_at_end());
            assert_eq!(
                drain(&mut restored).unwrap(),
                expected,
                "num_parallel_calls={num_parallel_calls}, consumed={consumed}"
            );
        }
    }
}

#[test]
fn test_non_strict_records_only_inner_position() {
    let mut source =
        MapSource::from_fn(ListSource::new((1i64..=10).collect()), square, deterministic(3)).unwrap();
    take(&mut source, 1).unwrap();

    let mut tape = Tape::new();
    source.record_position(&mut tape, false).unwrap();
    assert_eq!(tape.len(), 1);

    // The two buffered results are lost; the restored source resumes after the batch.
    let mut restored =
        MapSource::from_fn(ListSource::new((1i64..=10).collect()), square, deterministic(3)).unwrap();
    restored.reload_position(&mut tape, false).unwrap();
    assert_eq!(drain(&mut restored).unwrap(), vec![16, 36, 49, 64, 81]);
}

#[test]
fn test_async_record_waits_for_in_flight_tasks() {
    let input: Vec<i64> = (0..60).collect();
    let options = asynchronous(4);
    let slow = jittered(Duration::from_millis(2), 3, |x: i64| Ok(Some(x)));
    let mut original = MapSource::from_fn(ListSource::new(input.clone()), slow, options.clone()).unwrap();

    let mut consumed = take(&mut original, 13).unwrap();
    let mut tape = Tape::new();
    original.record_position(&mut tape, true).unwrap();
    assert_eq!(original.num_in_flight(), 0);

    let mut restored =
        MapSource::from_fn(ListSource::new(input.clone()), |x: i64| Ok(Some(x)), options).unwrap();
    restored.reload_position(&mut tape, true).unwrap();
    consumed.extend(drain(&mut restored).unwrap());
    consumed.sort();
    assert_eq!(consumed, input);

    // The original carries on from the same point.
    let mut rest = take(&mut original, 13).unwrap();
    rest.extend(drain(&mut original).unwrap());
    assert_eq!(rest.len(), 60 - 13);
}

#[test]
fn test_async_round_trip_with_dropped_results() {
    let input: Vec<i64> = (0..80).collect();
    let options = asynchronous(4);
    let keep_non_multiples = |x: i64| Ok((x % 3 != 0).then_some(x));
    let slow = jittered(Duration::from_millis(1), 5, keep_non_multiples);
    let mut original = MapSource::from_fn(ListSource::new(input.clone()), slow, options.clone()).unwrap();

    let mut consumed = take(&mut original, 10).unwrap();
    let mut tape = Tape::new();
    original.record_position(&mut tape, true).unwrap();

    let mut tape = persist_and_reload(&tape).unwrap();
    let mut restored =
        MapSource::from_fn(ListSource::new(input.clone()), keep_non_multiples, options).unwrap();
    restored.reload_position(&mut tape, true).unwrap();
    consumed.extend(drain(&mut restored).unwrap());
    consumed.sort();
    assert_eq!(consumed, input.into_iter().filter(|x| x % 3 != 0).collect::<Vec<_>>());
}

#[test]
fn test_async_reload_clears_failure() {
    let input: Vec<i64> = (1..=8).collect();
    let mut healthy =
        MapSource::from_fn(ListSource::new(input.clone()), |x: i64| Ok(Some(x)), asynchronous(2)).unwrap();
    let mut tape = Tape::new();
    healthy.record_position(&mut tape, true).unwrap();

    let mut failing = MapSource::from_fn(ListSource::new(input.clone()), fail_on(6), asynchronous(2)).unwrap();
    let err = loop {
        if let Err(e) = failing.next() {
            break e;
        }
    };
    assert!(matches!(err.kind(), ErrorKind::Transform { .. }));
    assert_eq!(failing.phase(), MapPhase::Failed);

    // A strict record cannot capture a failed source.
    let mut scratch = Tape::new();
    let record_err = failing.record_position(&mut scratch, true).unwrap_err();
    assert!(record_err.same_failure(&err));

    tape.rewind();
    failing.reload_position(&mut tape, true).unwrap();
    assert_eq!(failing.phase(), MapPhase::Idle);
    // With two calls in flight, element 6 is not admitted before the third result.
    let mut resumed = take(&mut failing, 3).unwrap();
    resumed.sort();
    assert_eq!(resumed.len(), 3);
    assert!(resumed.iter().all(|x| (1..=4).contains(x)));
}

#[test]
fn test_inner_position_follows_buffer() {
    let inner = CountingSource::new(9);
    let pulls = inner.pull_counter();
    let mut source = MapSource::from_fn(inner, |x: i64| Ok(Some(x)), deterministic(4)).unwrap();
    assert_eq!(source.next().unwrap(), Some(1));
    assert_eq!(pulls.load(std::sync::atomic::Ordering::SeqCst), 4);

    let mut tape = Tape::new();
    source.record_position(&mut tape, true).unwrap();
    // buffer, cursor, inner position
    assert_eq!(tape.len(), 3);
}

#[test]
fn test_pipeline_state_survives_persistence() {
    let build = || {
        pipeline::read_shuffled_list((0i64..30).collect(), 11)
            .map_fn(|x: i64| Ok((x % 4 != 0).then_some(x + 1)), deterministic(3))
            .unwrap()
            .map_fn(|x: i64| Ok(Some(x * 2)), Default::default())
            .unwrap()
            .and_return()
    };

    let mut original = build();
    let head: Vec<i64> = original.by_ref().take(5).map(|r| r.unwrap()).collect();
    assert_eq!(head.len(), 5);

    let state = original.state(true).unwrap();
    let bytes = state.to_bytes().unwrap();
    let expected: Vec<i64> = original.by_ref().map(|r| r.unwrap()).collect();

    let mut restored = build();
    let mut state = Tape::from_bytes(&bytes).unwrap();
    restored.load_state(&mut state, true).unwrap();
    let resumed: Vec<i64> = restored.by_ref().map(|r| r.unwrap()).collect();
    assert_eq!(resumed, expected);

    restored.reset(true).unwrap();
    let replayed: Vec<i64> = restored.by_ref().take(5).map(|r| r.unwrap()).collect();
    assert_eq!(replayed, head);
}
