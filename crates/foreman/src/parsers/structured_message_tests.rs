use super::*;

#[test]
fn parses_result_with_nested_usage() {
    let mut parser = StructuredMessageParser;
    let line = r#"{"type":"result","cost":0.42,"message":{"usage":{"input_tokens":100,"output_tokens":50}}}"#;
    let parsed = parser.parse_line(line).expect("should parse");
    match parsed {
        ParsedMessage::Result { cost, message } => {
            assert_eq!(cost, Some(0.42));
            let usage = message.expect("message").usage.expect("usage");
            assert_eq!(usage.input_tokens, 100);
            assert_eq!(usage.output_tokens, 50);
        }
        other => panic!("expected Result, got {other:?}"),
    }
}

#[test]
fn malformed_json_is_silently_skipped() {
    let mut parser = StructuredMessageParser;
    assert!(parser.parse_line("{not json at all").is_none());
    assert!(parser.parse_line("plain text output").is_none());
}

#[test]
fn non_json_lines_are_never_attempted() {
    let mut parser = StructuredMessageParser;
    assert!(parser.parse_line("").is_none());
    assert!(parser.parse_line("   ").is_none());
}

#[test]
fn discriminator_reports_the_right_tag() {
    let mut parser = StructuredMessageParser;
    let msg = parser
        .parse_line(r#"{"type":"assistant","text":"hello"}"#)
        .expect("should parse");
    assert_eq!(msg.discriminator(), "assistant");
}
