use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use runroster_core::{ParticipantId, TieTracker};

#[test]
fn simultaneous_pings_produce_one_tie_per_late_arrival() {
    const PARTICIPANTS: usize = 16;
    let tracker = Arc::new(TieTracker::new(Duration::hours(48)));
    let barrier = Arc::new(Barrier::new(PARTICIPANTS));
    let bucket = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();

    let handles: Vec<_> = (0..PARTICIPANTS)
        .map(|i| {
            let tracker = Arc::clone(&tracker);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                tracker.record_ping(bucket, ParticipantId(format!("p{i}")))
            })
        })
        .collect();

    let events: Vec<_> = handles
        .into_iter()
        .filter_map(|handle| handle.join().expect("ping thread panicked"))
        .collect();

    assert_eq!(events.len(), PARTICIPANTS - 1);
    let mut sizes: Vec<usize> = events.iter().map(|event| event.participants.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, (2..=PARTICIPANTS).collect::<Vec<_>>());

    // The largest event lists everyone, and every smaller one is its prefix.
    let largest = events
        .iter()
        .max_by_key(|event| event.participants.len())
        .unwrap();
    for event in &events {
        assert_eq!(
            event.participants[..],
            largest.participants[..event.participants.len()]
        );
    }
    assert_eq!(tracker.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pings_from_many_tasks_in_distinct_buckets_never_tie() {
    let tracker = Arc::new(TieTracker::new(Duration::hours(48)));
    let start = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                tracker.record_ping(start + Duration::seconds(i), ParticipantId::from("solo"))
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), None);
    }
    assert_eq!(tracker.len(), 32);
}
