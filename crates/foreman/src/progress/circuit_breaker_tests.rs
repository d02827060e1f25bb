use super::*;
use crate::parsers::status_block::{OverallStatus, TestsStatus};

fn block(files: u32, tasks: u32) -> StatusBlock {
    StatusBlock {
        overall_status: OverallStatus::InProgress,
        tasks_completed_this_cycle: tasks,
        files_modified_this_cycle: files,
        tests_status: TestsStatus::NotRun,
        work_type: String::new(),
        exit_signal: false,
        recommendation: None,
    }
}

#[test]
fn two_consecutive_no_progress_cycles_warn() {
    let mut breaker = CircuitBreaker::new();
    assert_eq!(breaker.observe_status_block(&block(0, 0), 1), None);
    let transition = breaker.observe_status_block(&block(0, 0), 2).expect("second failure warns");
    assert_eq!(transition.to, BreakerState::HalfOpen);
    assert!(!breaker.is_open());
}

#[test]
fn three_consecutive_no_progress_cycles_open_the_breaker() {
    let mut breaker = CircuitBreaker::new();
    breaker.observe_status_block(&block(0, 0), 1);
    breaker.observe_status_block(&block(0, 0), 2);
    let transition = breaker.observe_status_block(&block(0, 0), 3).expect("third failure opens");
    assert_eq!(transition.to, BreakerState::Open);
    assert!(breaker.is_open());
}

#[test]
fn progress_closes_a_half_open_breaker() {
    let mut breaker = CircuitBreaker::new();
    breaker.observe_status_block(&block(0, 0), 1);
    breaker.observe_status_block(&block(0, 0), 2);
    let transition = breaker.observe_status_block(&block(1, 0), 3).expect("progress closes half-open");
    assert_eq!(transition.to, BreakerState::Closed);
    assert_eq!(breaker.last_cycle_with_progress(), Some(3));
}

#[test]
fn progress_does_not_reopen_an_open_breaker() {
    let mut breaker = CircuitBreaker::new();
    breaker.observe_status_block(&block(0, 0), 1);
    breaker.observe_status_block(&block(0, 0), 2);
    breaker.observe_status_block(&block(0, 0), 3);
    assert!(breaker.is_open());
    assert_eq!(breaker.observe_status_block(&block(1, 0), 4), None);
    assert!(breaker.is_open());
}

#[test]
fn explicit_reset_clears_an_open_breaker() {
    let mut breaker = CircuitBreaker::new();
    breaker.observe_status_block(&block(0, 0), 1);
    breaker.observe_status_block(&block(0, 0), 2);
    breaker.observe_status_block(&block(0, 0), 3);
    assert!(breaker.is_open());
    breaker.reset();
    assert!(!breaker.is_open());
}

#[test]
fn counter_families_are_independent() {
    let mut breaker = CircuitBreaker::new();
    breaker.observe_repeated_error(true);
    breaker.observe_repeated_error(true);
    breaker.observe_repeated_error(true);
    assert!(breaker.is_open());
    // no-progress family never saw a failure.
    assert_eq!(breaker.observe_status_block(&block(1, 0), 1), None);
}

#[test]
fn tests_failing_too_long_follows_the_same_threshold_pattern() {
    let mut breaker = CircuitBreaker::new();
    assert_eq!(breaker.observe_tests_failing(true), None);
    let warn = breaker.observe_tests_failing(true).expect("second failure warns");
    assert_eq!(warn.to, BreakerState::HalfOpen);
    let open = breaker.observe_tests_failing(true).expect("third failure opens");
    assert_eq!(open.to, BreakerState::Open);
}

#[test]
fn a_single_no_progress_cycle_does_not_yet_warn() {
    let mut breaker = CircuitBreaker::new();
    assert_eq!(breaker.observe_status_block(&block(0, 0), 1), None);
    assert!(!breaker.is_open());
}
