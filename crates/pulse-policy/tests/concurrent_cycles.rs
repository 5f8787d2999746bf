//! Concurrency tests for the decide → append cycle.
//!
//! Many workers observing the same never-seen entity at once must leave
//! exactly one `first_snapshot` behind, whether they share a tracker
//! (per-entity lock) or not (store compare-and-append).

use std::sync::{Arc, Barrier};
use std::thread;

use pulse_core::{Metrics, Observation, SnapshotReason};
use pulse_policy::{SnapshotPolicy, TrackError, Tracker};
use pulse_state::{ErrorKind, StateStore};

const WORKERS: usize = 8;

fn test_metrics() -> Metrics {
    Metrics {
        followers: 1000,
        following: 100,
        likes: 5000,
        videos: 20,
    }
}

#[test]
fn shared_tracker_writes_one_first_snapshot() {
    let store = StateStore::open_in_memory().unwrap();
    let tracker = Arc::new(Tracker::new(SnapshotPolicy::new(store.clone())));
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let obs = Observation::new("@Racer", test_metrics()).unwrap();
                barrier.wait();
                tracker.observe(&obs).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let created: Vec<_> = outcomes.iter().filter(|o| o.was_created()).collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].decision.reason, SnapshotReason::FirstSnapshot);
    assert!(outcomes
        .iter()
        .filter(|o| !o.was_created())
        .all(|o| o.decision.reason == SnapshotReason::NoSignificantChanges));

    let entity = store.get_entity_by_key("racer").unwrap().unwrap();
    assert_eq!(store.history(entity.id, 100).unwrap().len(), 1);
}

#[test]
fn independent_trackers_are_fenced_by_the_store() {
    let store = StateStore::open_in_memory().unwrap();
    let barrier = Arc::new(Barrier::new(WORKERS));

    // One tracker per worker: no shared lock, as with separate processes.
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let tracker = Tracker::new(SnapshotPolicy::new(store.clone()));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let obs = Observation::new("racer", test_metrics()).unwrap();
                barrier.wait();
                tracker.observe(&obs)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let created = results
        .iter()
        .filter(|r| matches!(r, Ok(o) if o.was_created()))
        .count();
    assert_eq!(created, 1);

    // Losers either saw the winner's snapshot or were rejected as stale.
    for result in &results {
        match result {
            Ok(outcome) if !outcome.was_created() => {
                assert_eq!(outcome.decision.reason, SnapshotReason::NoSignificantChanges)
            }
            Ok(_) => {}
            Err(e @ TrackError::State(_)) => assert_eq!(e.state_kind(), Some(ErrorKind::Conflict)),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let entity = store.get_entity_by_key("racer").unwrap().unwrap();
    let history = store.history(entity.id, 100).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, SnapshotReason::FirstSnapshot);
}

#[test]
fn distinct_entities_proceed_in_parallel() {
    let store = StateStore::open_in_memory().unwrap();
    let tracker = Arc::new(Tracker::new(SnapshotPolicy::new(store.clone())));

    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                let obs = Observation::new(&format!("creator-{i}"), test_metrics()).unwrap();
                tracker.observe(&obs).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.join().unwrap();
        assert_eq!(outcome.decision.reason, SnapshotReason::FirstSnapshot);
    }

    let stats = store.stats(0).unwrap();
    assert_eq!(stats.total_entities, WORKERS as u64);
    assert_eq!(stats.total_snapshots, WORKERS as u64);
}
