use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tokio::sync::mpsc;

use super::*;
use crate::config::Config;
use crate::multiplexer::{CpuPriority, ReadChunk};
use crate::session::{PermissionPolicy, SessionMode};

struct FakeAdapter {
    existing: Mutex<HashSet<String>>,
}

impl FakeAdapter {
    fn new() -> Self {
        Self { existing: Mutex::new(HashSet::new()) }
    }
}

impl MultiplexerAdapter for FakeAdapter {
    fn create_session(&self, name: &str, _working_dir: &Path, _command: &[String], _env: &[(String, String)], _cpu_priority: CpuPriority) -> Result<(), AppError> {
        self.existing.lock().expect("lock").insert(name.to_owned());
        Ok(())
    }

    fn attach_read_stream(&self, _name: &str) -> Result<mpsc::Receiver<ReadChunk>, AppError> {
        let (_tx, rx) = mpsc::channel(4);
        Ok(rx)
    }

    fn write(&self, _name: &str, _bytes: &[u8]) -> Result<(), AppError> {
        Ok(())
    }

    fn resize(&self, _name: &str, _cols: u16, _rows: u16) -> Result<(), AppError> {
        Ok(())
    }

    fn kill(&self, name: &str) -> Result<(), AppError> {
        self.existing.lock().expect("lock").remove(name);
        Ok(())
    }

    fn list(&self) -> Result<HashSet<String>, AppError> {
        Ok(self.existing.lock().expect("lock").clone())
    }

    fn exists(&self, name: &str) -> Result<bool, AppError> {
        Ok(self.existing.lock().expect("lock").contains(name))
    }
}

fn test_supervisor(state_dir: &Path, max_sessions: usize) -> Arc<Supervisor> {
    let config = Config::parse_from([
        "foreman",
        "--state-dir",
        state_dir.to_str().expect("utf8 path"),
        "--max-sessions",
        &max_sessions.to_string(),
    ]);
    let adapter: Arc<dyn MultiplexerAdapter> = Arc::new(FakeAdapter::new());
    Arc::new(Supervisor::new(&config, adapter))
}

fn session_request() -> CreateSessionRequest {
    CreateSessionRequest {
        config: SessionConfig {
            name: Some("demo".to_owned()),
            color_tag: None,
            working_dir: std::path::PathBuf::from("/tmp"),
            mode: SessionMode::Interactive,
            assistant_variant: "claude".to_owned(),
            model: None,
            permission_policy: PermissionPolicy::Default,
            cpu_priority: CpuPriority::Normal,
        },
        command: vec!["claude".to_owned()],
        env: Vec::new(),
        completion_phrase: None,
        respawn: None,
    }
}

#[tokio::test]
async fn creating_a_session_registers_it_and_persists_a_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), 50);

    let id = supervisor.create_session(session_request()).await.expect("create session");
    assert_eq!(supervisor.session_count().await, 1);

    let snapshot = supervisor.snapshot(&id).await.expect("snapshot exists");
    assert_eq!(snapshot.state, SessionState::Creating);

    supervisor.store.force_flush().await.expect("flush");
    let state = supervisor.store.snapshot().await;
    assert!(state.sessions.contains_key(&id));
}

#[tokio::test]
async fn the_concurrent_session_cap_is_enforced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), 1);

    supervisor.create_session(session_request()).await.expect("first session creates fine");
    let err = supervisor.create_session(session_request()).await.expect_err("second session should be rejected");
    assert_eq!(err.code, crate::error::ErrorCode::ResourceExhausted);
}

#[tokio::test]
async fn stopping_an_unknown_session_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), 50);
    let err = supervisor.stop_session("nope").await.expect_err("missing session");
    assert_eq!(err.code, crate::error::ErrorCode::NotFound);
}

#[tokio::test]
async fn terminate_session_kills_the_pane_and_forgets_the_mapping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), 50);
    let id = supervisor.create_session(session_request()).await.expect("create session");

    supervisor.terminate_session(&id).await.expect("terminate");

    let mapping = supervisor.pane_registry.load();
    assert!(!mapping.contains_key(&id));
}

#[tokio::test]
async fn shutdown_force_flushes_state_without_killing_panes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let supervisor = test_supervisor(dir.path(), 50);
    supervisor.create_session(session_request()).await.expect("create session");

    supervisor.shutdown().await.expect("shutdown");

    assert!(dir.path().join("state.json").exists());
}
