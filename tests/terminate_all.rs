//! The process-wide emergency stop. Kept in its own test binary because it
//! cancels every session of the process.

use parmap::parallel::active_sessions;
use parmap::{MapOptions, map, terminate_all};
use std::thread;
use std::time::Duration;

#[test]
fn test_terminate_all_stops_leaked_sessions() {
    let options = MapOptions::new().workers(2).redirect_output(false);
    let slow = |x: u32| {
        thread::sleep(Duration::from_millis(10));
        Ok(x)
    };

    let first = map(slow, 0..1_000, &options).unwrap();
    let second = map(slow, 0..1_000, &options).unwrap();
    let ids = [first.session_id(), second.session_id()];

    // A forgotten sequence never runs its drop and stays registered.
    std::mem::forget(first);
    std::mem::forget(second);
    for id in ids {
        assert!(active_sessions().contains(&id));
    }

    assert_eq!(terminate_all(), 2);
    assert!(active_sessions().is_empty());
    assert_eq!(terminate_all(), 0);
}
