use super::*;
use crate::session::{PermissionPolicy, SessionMode};

fn sample_config() -> SessionConfig {
    SessionConfig {
        name: Some("demo".to_owned()),
        color_tag: None,
        working_dir: std::path::PathBuf::from("/tmp"),
        mode: SessionMode::Interactive,
        assistant_variant: "claude".to_owned(),
        model: None,
        permission_policy: PermissionPolicy::Default,
        cpu_priority: crate::multiplexer::CpuPriority::Normal,
    }
}

fn sample_respawn() -> PersistedRespawnConfig {
    PersistedRespawnConfig {
        update_prompt: "recap".to_owned(),
        clear_directive: "/clear\r".to_owned(),
        init_directive: "/init\r".to_owned(),
        kickstart_prompt: "continue".to_owned(),
        send_clear: true,
        send_init: true,
        auto_accept: false,
        inter_step_delay_ms: 250,
        auto_accept_confirm_delay_ms: 1500,
        confirm_initial_secs: 10,
        confirm_min_secs: 5,
        confirm_max_secs: 60,
        confirm_min_samples: 5,
        confirm_buffer: 0.2,
    }
}

fn sample_record(id: &str) -> SessionRecord {
    SessionRecord {
        id: id.to_owned(),
        config: sample_config(),
        pane_name: format!("foreman-{id}"),
        respawn: sample_respawn(),
        todos: Vec::new(),
        created_at_ms: 0,
    }
}

#[tokio::test]
async fn loading_an_empty_directory_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::load(dir.path(), Duration::from_millis(20));
    let snapshot = store.snapshot().await;
    assert!(snapshot.sessions.is_empty());
    assert_eq!(snapshot.sessions_ever_created, 0);
}

#[tokio::test]
async fn force_flush_writes_state_json_immediately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::load(dir.path(), Duration::from_secs(60));
    store.upsert_session(sample_record("s1")).await;
    store.force_flush().await.expect("flush");

    let contents = std::fs::read_to_string(dir.path().join("state.json")).expect("state.json exists");
    assert!(contents.contains("\"s1\""));

    let reloaded = StateStore::load(dir.path(), Duration::from_millis(20));
    let snapshot = reloaded.snapshot().await;
    assert_eq!(snapshot.sessions_ever_created, 1);
    assert!(snapshot.sessions.contains_key("s1"));
}

#[tokio::test]
async fn rapid_upserts_coalesce_into_a_single_debounced_flush() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::load(dir.path(), Duration::from_millis(40));

    for n in 0..5 {
        store.upsert_session(sample_record(&format!("s{n}"))).await;
    }
    assert!(!dir.path().join("state.json").exists(), "flush should not have fired yet");

    tokio::time::sleep(Duration::from_millis(120)).await;
    let contents = std::fs::read_to_string(dir.path().join("state.json")).expect("state.json exists after debounce");
    for n in 0..5 {
        assert!(contents.contains(&format!("\"s{n}\"")));
    }
}

#[tokio::test]
async fn reset_clears_in_memory_state_and_force_flushes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::load(dir.path(), Duration::from_secs(60));
    store.upsert_session(sample_record("s1")).await;
    store.force_flush().await.expect("flush");

    store.reset().await.expect("reset");
    let snapshot = store.snapshot().await;
    assert!(snapshot.sessions.is_empty());

    let contents = std::fs::read_to_string(dir.path().join("state.json")).expect("state.json still exists");
    assert!(!contents.contains("\"s1\""));
}

#[tokio::test]
async fn record_usage_accumulates_totals_and_buckets_by_day() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::load(dir.path(), Duration::from_secs(60));
    store.record_usage(100, 10, 20, 0.01).await;
    store.record_usage(100, 5, 5, 0.02).await;
    store.record_usage(101, 1, 1, 0.03).await;

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.total_input_tokens, 16);
    assert_eq!(snapshot.total_output_tokens, 26);
    assert!((snapshot.total_cost - 0.06).abs() < 1e-9);
    assert_eq!(snapshot.daily_tokens.len(), 2);
    assert_eq!(snapshot.daily_tokens[0].input_tokens, 15);
    assert_eq!(snapshot.daily_tokens[1].input_tokens, 1);
}
