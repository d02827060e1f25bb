use super::*;

#[test]
fn bracketed_checkbox_pending() {
    let mut detector = TodoLineDetector::new();
    let upsert = detector.observe_line("- [ ] write the parser").expect("matches checkbox form");
    assert_eq!(upsert.text, "write the parser");
    assert_eq!(upsert.status, TodoStatus::Pending);
}

#[test]
fn bracketed_checkbox_done() {
    let mut detector = TodoLineDetector::new();
    let upsert = detector.observe_line("- [x] write the parser").expect("matches checkbox form");
    assert_eq!(upsert.status, TodoStatus::Done);
}

#[test]
fn bracketed_checkbox_skipped() {
    let mut detector = TodoLineDetector::new();
    let upsert = detector.observe_line("- [-] write the parser").expect("matches checkbox form");
    assert_eq!(upsert.status, TodoStatus::Skipped);
}

#[test]
fn status_in_parentheses() {
    let mut detector = TodoLineDetector::new();
    let upsert = detector.observe_line("(in-progress) refactor the buffer").expect("matches parens form");
    assert_eq!(upsert.status, TodoStatus::InProgress);
    assert_eq!(upsert.text, "refactor the buffer");
}

#[test]
fn explicit_indicator_line() {
    let mut detector = TodoLineDetector::new();
    let upsert = detector.observe_line("DONE: ship the release").expect("matches indicator form");
    assert_eq!(upsert.status, TodoStatus::Done);
    assert_eq!(upsert.text, "ship the release");
}

#[test]
fn checkmark_prefixed_completion() {
    let mut detector = TodoLineDetector::new();
    let upsert = detector.observe_line("✓ wrote the tests").expect("matches checkmark form");
    assert_eq!(upsert.status, TodoStatus::Done);
    assert_eq!(upsert.text, "wrote the tests");
}

#[test]
fn native_tool_call_form_with_explicit_id() {
    let mut detector = TodoLineDetector::new();
    let line = r#"{"todo": {"id":"abc123","text":"build the crate","status":"done"}}"#;
    let upsert = detector.observe_line(line).expect("matches tool-call form");
    assert_eq!(upsert.id, "abc123");
    assert_eq!(upsert.text, "build the crate");
    assert_eq!(upsert.status, TodoStatus::Done);
}

#[test]
fn same_text_produces_a_stable_id_across_formats() {
    let mut a = TodoLineDetector::new();
    let mut b = TodoLineDetector::new();
    let first = a.observe_line("- [ ] Write the Parser").unwrap();
    let second = b.observe_line("(pending) write the parser").unwrap();
    assert_eq!(first.id, second.id);
}

#[test]
fn adjacent_identical_lines_are_deduplicated() {
    let mut detector = TodoLineDetector::new();
    assert!(detector.observe_line("- [ ] write the parser").is_some());
    assert_eq!(detector.observe_line("- [ ] write the parser"), None);
}

#[test]
fn unrelated_lines_produce_nothing() {
    let mut detector = TodoLineDetector::new();
    assert_eq!(detector.observe_line("just some ordinary output"), None);
}

#[test]
fn repeated_line_after_a_different_line_fires_again() {
    let mut detector = TodoLineDetector::new();
    assert!(detector.observe_line("- [ ] write the parser").is_some());
    assert!(detector.observe_line("- [x] write the parser").is_some());
    assert!(detector.observe_line("- [ ] write the parser").is_some());
}
