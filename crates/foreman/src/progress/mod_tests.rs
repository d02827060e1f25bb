use super::*;

#[test]
fn tracker_starts_disabled_and_ignores_plain_output() {
    let mut tracker = ProgressTracker::new(20);
    let events = tracker.observe_line("just some ordinary output");
    assert!(events.is_empty());
    assert!(!tracker.is_enabled());
}

#[test]
fn a_bracketed_checkbox_line_auto_enables_the_tracker() {
    let mut tracker = ProgressTracker::new(20);
    let events = tracker.observe_line("- [ ] write the parser");
    assert!(matches!(events[0], ProgressEvent::Enabled));
    assert!(tracker.is_enabled());
}

#[test]
fn disabling_auto_enable_suppresses_it() {
    let mut tracker = ProgressTracker::new(20);
    tracker.disable_auto_enable();
    let events = tracker.observe_line("- [ ] write the parser");
    assert!(events.is_empty());
    assert!(!tracker.is_enabled());
}

#[test]
fn start_loop_enables_and_arms_the_completion_detector() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");
    assert!(tracker.is_enabled());
    let events = tracker.observe_line("<promise>RALPH_DONE</promise>");
    assert!(events.is_empty()); // first occurrence is the stored intent
}

#[test]
fn exit_gate_requires_both_completion_phrase_and_complete_status_block() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");
    tracker.observe_line("<promise>RALPH_DONE</promise>");
    assert!(!tracker.is_complete());

    tracker.observe_line("---RALPH_STATUS---");
    tracker.observe_line("STATUS: COMPLETE");
    tracker.observe_line("TASKS_COMPLETED_THIS_LOOP: 1");
    tracker.observe_line("FILES_MODIFIED: 1");
    tracker.observe_line("EXIT_SIGNAL: true");
    tracker.observe_line("---END_RALPH_STATUS---");
    assert!(!tracker.is_complete()); // completion phrase has not fired yet

    tracker.observe_line("<promise>RALPH_DONE</promise>");
    assert!(tracker.is_complete());
}

#[test]
fn a_stale_status_block_parsed_before_the_intent_occurrence_does_not_satisfy_the_gate() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");

    // A complete+exit-signal status block from an earlier cycle, parsed
    // before the completion phrase is ever mentioned.
    tracker.observe_line("---RALPH_STATUS---");
    tracker.observe_line("STATUS: COMPLETE");
    tracker.observe_line("TASKS_COMPLETED_THIS_LOOP: 1");
    tracker.observe_line("FILES_MODIFIED: 1");
    tracker.observe_line("EXIT_SIGNAL: true");
    tracker.observe_line("---END_RALPH_STATUS---");
    assert!(!tracker.is_complete());

    // The phrase now fires twice (stored intent, then completion) with no
    // new status block in between; the stale block above must not count.
    tracker.observe_line("<promise>RALPH_DONE</promise>");
    tracker.observe_line("<promise>RALPH_DONE</promise>");
    assert!(!tracker.is_complete());
}

#[test]
fn a_status_block_with_exit_signal_but_no_completion_phrase_is_not_enough() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");
    tracker.observe_line("---RALPH_STATUS---");
    tracker.observe_line("STATUS: COMPLETE");
    tracker.observe_line("TASKS_COMPLETED_THIS_LOOP: 1");
    tracker.observe_line("FILES_MODIFIED: 1");
    tracker.observe_line("EXIT_SIGNAL: true");
    tracker.observe_line("---END_RALPH_STATUS---");
    assert!(!tracker.is_complete());
}

#[test]
fn repeated_no_progress_status_blocks_open_the_circuit_breaker() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");
    for _ in 0..3 {
        tracker.observe_line("---RALPH_STATUS---");
        tracker.observe_line("STATUS: IN_PROGRESS");
        tracker.observe_line("TASKS_COMPLETED_THIS_LOOP: 0");
        tracker.observe_line("FILES_MODIFIED: 0");
        tracker.observe_line("---END_RALPH_STATUS---");
    }
    assert!(tracker.is_circuit_open());
    tracker.reset_circuit_breaker();
    assert!(!tracker.is_circuit_open());
}

#[test]
fn full_reset_clears_plan_history_and_disables_the_tracker() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");
    tracker.add_todo("write the parser", Priority::P0, None);
    tracker.reset(true);
    assert!(!tracker.is_enabled());
    assert!(tracker.todos().is_empty());
    assert!(tracker.get_history().is_empty());
}

#[test]
fn partial_reset_keeps_the_plan_but_clears_per_cycle_state() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");
    tracker.add_todo("write the parser", Priority::P0, None);
    tracker.observe_line("<promise>RALPH_DONE</promise>");
    tracker.reset(false);
    assert!(tracker.is_enabled());
    assert_eq!(tracker.todos().len(), 1);
}

#[test]
fn todo_upserts_flow_through_observe_line() {
    let mut tracker = ProgressTracker::new(20);
    tracker.start_loop("RALPH_DONE");
    let events = tracker.observe_line("- [x] write the parser");
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::TodoUpsert(_))));
}
