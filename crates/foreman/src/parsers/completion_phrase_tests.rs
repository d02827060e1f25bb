use super::*;

#[test]
fn first_occurrence_is_intent_not_completion() {
    let mut detector = CompletionPhraseDetector::new("DONE_MARKER");
    let result = detector.observe_line("starting work, will say <promise>DONE_MARKER</promise> later");
    assert_eq!(result, None);
    assert!(detector.intent_stored());
}

#[test]
fn second_occurrence_is_completion() {
    let mut detector = CompletionPhraseDetector::new("DONE_MARKER");
    detector.observe_line("<promise>DONE_MARKER</promise>");
    let result = detector.observe_line("<promise>DONE_MARKER</promise>");
    assert_eq!(result, Some("DONE_MARKER".to_owned()));
}

#[test]
fn matching_is_case_sensitive() {
    let mut detector = CompletionPhraseDetector::new("Done");
    assert_eq!(detector.observe_line("<promise>done</promise>"), None);
    assert!(!detector.intent_stored());
}

#[test]
fn reset_allows_a_fresh_intent_completion_pair() {
    let mut detector = CompletionPhraseDetector::new("X");
    detector.observe_line("<promise>X</promise>");
    detector.reset();
    assert!(!detector.intent_stored());
    assert_eq!(detector.observe_line("<promise>X</promise>"), None);
}
