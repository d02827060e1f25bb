use super::*;

#[test]
fn a_single_chunk_with_several_lines_produces_events_for_each() {
    let mut pipeline = ParserPipeline::new(ParserConfig::default());
    let events = pipeline.feed(b"hello\nworld\n");
    // Neither line matches any parser, so feeding succeeds with no events
    // and, critically, without panicking or losing the newline boundary.
    assert!(events.is_empty());
}

#[test]
fn a_line_split_across_two_feed_calls_produces_the_same_events_as_unsplit() {
    let mut split = ParserPipeline::new(ParserConfig::default());
    let mut events = split.feed(b"<promise>DONE</");
    events.extend(split.feed(b"promise>\n"));

    let mut whole = ParserPipeline::new(ParserConfig::default());
    let whole_events = whole.feed(b"<promise>DONE</promise>\n");

    assert_eq!(events.len(), whole_events.len());
}

#[test]
fn a_status_block_split_across_chunks_is_parsed_exactly_once() {
    let mut pipeline = ParserPipeline::new(ParserConfig::default());
    let mut events = pipeline.feed(b"---RALPH_STATUS---\nSTATUS: COMPLETE\nTASKS_COMPLETED_THIS_LOOP: 1\n");
    events.extend(pipeline.feed(b"FILES_MODIFIED: 1\n---END_RALPH_STATUS---\n"));

    let status_events: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ParserEvent::StatusBlock(_)))
        .collect();
    assert_eq!(status_events.len(), 1);
}

#[test]
fn an_unterminated_status_block_yields_no_status_block_events() {
    let mut pipeline = ParserPipeline::new(ParserConfig::default());
    let events = pipeline.feed(b"---RALPH_STATUS---\nSTATUS: COMPLETE\nTASKS_COMPLETED_THIS_LOOP: 1\nFILES_MODIFIED: 1\n");
    assert!(!events.iter().any(|e| matches!(e, ParserEvent::StatusBlock(_))));
}

#[test]
fn every_parser_runs_against_every_line_regardless_of_earlier_matches() {
    let mut pipeline = ParserPipeline::new(ParserConfig::default());
    // A structured-message line that also happens to look like a todo upsert
    // tool call: both parsers must get a chance to fire independently.
    let line = br#"{"type":"result","cost":0.1,"message":null}
"#;
    let events = pipeline.feed(line);
    assert!(events.iter().any(|e| matches!(e, ParserEvent::Message(_))));
}

#[test]
fn ansi_escapes_are_stripped_before_any_parser_sees_the_line() {
    let mut pipeline = ParserPipeline::new(ParserConfig::default());
    let events = pipeline.feed(b"\x1b[32m- [ ] write the parser\x1b[0m\n");
    assert!(events.iter().any(|e| matches!(e, ParserEvent::TodoUpsert(_))));
}

#[test]
fn flush_processes_a_trailing_line_with_no_newline() {
    let mut pipeline = ParserPipeline::new(ParserConfig::default());
    pipeline.feed(b"- [ ] partial line without newline");
    let events = pipeline.flush();
    assert!(events.iter().any(|e| matches!(e, ParserEvent::TodoUpsert(_))));
}

#[test]
fn worked_banner_and_completion_phrase_can_both_fire_on_distinct_lines() {
    let mut pipeline = ParserPipeline::new(ParserConfig::default());
    let events = pipeline.feed(b"\xe2\x9c\xbb Worked for 1m 0s\n<promise>RALPH_DONE</promise>\n");
    assert!(events.iter().any(|e| matches!(e, ParserEvent::Idle(IdleSignal::WorkedBanner))));
}
