use std::time::Duration;

use super::*;

fn timer() -> ConfirmTimer {
    ConfirmTimer::new(Duration::from_secs(10), Duration::from_secs(5), Duration::from_secs(60), 5, 0.2)
}

#[test]
fn before_enough_samples_the_initial_value_is_used() {
    let mut t = timer();
    t.record_observed_latency(Duration::from_secs(8));
    assert_eq!(t.sample_count(), 1);
    assert_eq!(t.current(), Duration::from_secs(10));
}

#[test]
fn once_enough_samples_the_p75_plus_buffer_is_used() {
    let mut t = timer();
    for latency in [1, 2, 3, 4, 20] {
        t.record_observed_latency(Duration::from_secs(latency));
    }
    // sorted: 1,2,3,4,20 -> p75 index = round(4*0.75) = 3 -> value 4s
    // buffered = 4s * 1.2 = 4.8s
    assert_eq!(t.current(), Duration::from_millis(4800));
}

#[test]
fn the_result_is_clamped_to_the_configured_minimum() {
    let mut t = ConfirmTimer::new(Duration::from_secs(10), Duration::from_secs(5), Duration::from_secs(60), 3, 0.2);
    for _ in 0..3 {
        t.record_observed_latency(Duration::from_millis(500));
    }
    assert_eq!(t.current(), Duration::from_secs(5));
}

#[test]
fn the_result_is_clamped_to_the_configured_maximum() {
    let mut t = ConfirmTimer::new(Duration::from_secs(10), Duration::from_secs(5), Duration::from_secs(60), 3, 0.2);
    for _ in 0..3 {
        t.record_observed_latency(Duration::from_secs(120));
    }
    assert_eq!(t.current(), Duration::from_secs(60));
}

#[test]
fn the_sample_window_is_bounded_to_the_most_recent_twenty() {
    let mut t = timer();
    for i in 0..30 {
        t.record_observed_latency(Duration::from_secs(i));
    }
    assert_eq!(t.sample_count(), 20);
}
