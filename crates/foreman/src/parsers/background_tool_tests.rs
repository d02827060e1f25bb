use std::time::Duration;

use super::*;

fn detector() -> BackgroundToolDetector {
    BackgroundToolDetector::new(
        20,
        Duration::from_secs(2),
        Duration::from_secs(30),
        Duration::from_secs(60),
    )
}

#[test]
fn explicit_tool_opens_and_closes_on_checkmark() {
    let mut d = detector();
    let start = d.observe_line("● Bash(tail -f /var/log/app.log)");
    assert!(matches!(start, Some(BackgroundToolEvent::ToolStart(ref t)) if t.command == "tail -f /var/log/app.log"));
    assert_eq!(d.active_count(), 1);

    let end = d.observe_line("✓ Bash completed in 1.2s");
    assert!(matches!(end, Some(BackgroundToolEvent::ToolEnd { .. })));
}

#[test]
fn explicit_tool_closes_on_cross_mark_too() {
    let mut d = detector();
    d.observe_line("● Bash(npm test)");
    let end = d.observe_line("✗ Bash failed");
    assert!(matches!(end, Some(BackgroundToolEvent::ToolEnd { .. })));
}

#[test]
fn close_targets_the_most_recently_opened_tool_lifo() {
    let mut d = detector();
    let first = match d.observe_line("● Bash(tail -f a.log)") {
        Some(BackgroundToolEvent::ToolStart(t)) => t.id,
        _ => panic!("expected start"),
    };
    let second = match d.observe_line("● Bash(tail -f b.log)") {
        Some(BackgroundToolEvent::ToolStart(t)) => t.id,
        _ => panic!("expected start"),
    };
    assert_ne!(first, second);

    let end = d.observe_line("✓ Bash");
    match end {
        Some(BackgroundToolEvent::ToolEnd { id }) => assert_eq!(id, second),
        _ => panic!("expected end"),
    }

    let end2 = d.observe_line("✓ Bash");
    match end2 {
        Some(BackgroundToolEvent::ToolEnd { id }) => assert_eq!(id, first),
        _ => panic!("expected end"),
    }
}

#[test]
fn timeout_suffix_is_parsed() {
    let mut d = detector();
    let start = d.observe_line("● Bash(long_running_build) (timeout: 120s)");
    match start {
        Some(BackgroundToolEvent::ToolStart(t)) => assert_eq!(t.timeout_secs, Some(120)),
        _ => panic!("expected start"),
    }
}

#[test]
fn unrelated_lines_are_ignored() {
    let mut d = detector();
    assert!(d.observe_line("just some regular output").is_none());
    assert_eq!(d.active_count(), 0);
}

#[test]
fn text_command_fallback_gets_tracked_without_the_bash_wrapper() {
    let mut d = detector();
    let start = d.observe_line("I'll run tail -f /var/log/app.log to watch it");
    assert!(matches!(start, Some(BackgroundToolEvent::ToolStart(_))));
    assert_eq!(d.active_count(), 1);

    let expired = d.expire();
    assert!(expired.is_empty(), "should not expire before the suggestion ttl elapses");
    assert_eq!(d.active_count(), 1);
}

#[test]
fn bare_log_path_mention_is_tracked_with_its_own_ttl() {
    let mut d = detector();
    let start = d.observe_line("writing output to /tmp/build-output.log for inspection");
    let expected = normalize_path("/tmp/build-output.log");
    match start {
        Some(BackgroundToolEvent::ToolStart(t)) => assert!(t.paths.contains(&expected)),
        other => panic!("expected ToolStart, got {other:?}"),
    }
}

#[test]
fn overflow_evicts_the_oldest_tool() {
    let mut d = BackgroundToolDetector::new(2, Duration::from_secs(2), Duration::from_secs(30), Duration::from_secs(60));
    d.observe_line("● Bash(one)");
    d.observe_line("● Bash(two)");
    d.observe_line("● Bash(three)");
    assert_eq!(d.active_count(), 2);
}

#[test]
fn relative_path_is_normalized_against_cwd() {
    let expected = std::env::current_dir().unwrap().join("server.log");
    assert_eq!(normalize_path("server.log"), expected.to_string_lossy());
}

#[test]
fn shallow_path_is_equivalent_to_a_deeper_absolute_path() {
    assert!(paths_equivalent("server.log", "/var/log/app/server.log"));
    assert!(!paths_equivalent("server.log", "/var/log/app/other.log"));
}

#[test]
fn cross_pattern_dedup_does_not_readd_an_already_tracked_path() {
    let mut d = detector();
    d.observe_line("● Bash(tail -f server.log)");
    let second = d.observe_line("writing output to server.log as it runs");
    match second {
        Some(BackgroundToolEvent::ToolStart(t)) => {
            assert!(t.paths.is_empty(), "path already tracked by the explicit tool should not be re-added")
        }
        other => panic!("expected a start event with deduped paths, got {other:?}"),
    }
}

#[test]
fn tools_update_is_debounced() {
    let mut d = detector();
    d.observe_line("● Bash(echo hi)");
    assert!(d.tools_update_due(Duration::from_millis(50)).is_some());
    d.observe_line("● Bash(echo again)");
    assert!(d.tools_update_due(Duration::from_secs(60)).is_none());
}

#[test]
fn expire_leaves_running_explicit_tools_alone() {
    let mut d = detector();
    d.observe_line("● Bash(sleep 1000)");
    let expired = d.expire();
    assert!(expired.is_empty());
    assert_eq!(d.active_count(), 1);
}
