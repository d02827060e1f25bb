use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use super::*;
use crate::multiplexer::CpuPriority;
use crate::session::{PermissionPolicy, Session, SessionConfig, SessionMode};

struct FakeAdapter {
    written: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeAdapter {
    fn new() -> Self {
        Self { written: Mutex::new(Vec::new()) }
    }
}

impl MultiplexerAdapter for FakeAdapter {
    fn create_session(
        &self,
        _name: &str,
        _working_dir: &Path,
        _command: &[String],
        _env: &[(String, String)],
        _cpu_priority: CpuPriority,
    ) -> Result<(), AppError> {
        Ok(())
    }

    fn attach_read_stream(&self, _name: &str) -> Result<mpsc::Receiver<ReadChunk>, AppError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), AppError> {
        self.written.lock().expect("lock").push((name.to_owned(), bytes.to_owned()));
        Ok(())
    }

    fn resize(&self, _name: &str, _cols: u16, _rows: u16) -> Result<(), AppError> {
        Ok(())
    }

    fn kill(&self, _name: &str) -> Result<(), AppError> {
        Ok(())
    }

    fn list(&self) -> Result<HashSet<String>, AppError> {
        Ok(HashSet::new())
    }

    fn exists(&self, _name: &str) -> Result<bool, AppError> {
        Ok(true)
    }
}

fn session_config(mode: SessionMode) -> SessionConfig {
    SessionConfig {
        name: Some("demo".to_owned()),
        color_tag: None,
        working_dir: std::path::PathBuf::from("/tmp"),
        mode,
        assistant_variant: "claude".to_owned(),
        model: None,
        permission_policy: PermissionPolicy::Default,
        cpu_priority: CpuPriority::Normal,
    }
}

fn test_respawn_config() -> RespawnConfig {
    RespawnConfig {
        update_prompt: "please post a status update\r".to_owned(),
        clear_directive: "/clear\r".to_owned(),
        init_directive: "/init\r".to_owned(),
        kickstart_prompt: "continue\r".to_owned(),
        accept_sequence: b"1\r".to_vec(),
        send_clear: true,
        send_init: true,
        auto_accept: true,
        inter_step_delay: Duration::from_millis(1),
        auto_accept_confirm_delay: Duration::from_millis(20),
        confirm_initial: Duration::from_millis(20),
        confirm_min: Duration::from_millis(10),
        confirm_max: Duration::from_secs(1),
        confirm_min_samples: 5,
        confirm_buffer: 0.2,
    }
}

#[tokio::test]
async fn one_shot_result_message_resolves_the_completion_channel() {
    let adapter: Arc<dyn MultiplexerAdapter> = Arc::new(FakeAdapter::new());
    let mut driver = SessionDriver::new(adapter, ParserConfig::default(), test_respawn_config(), Duration::from_millis(20));
    let mut session = Session::new("s1".to_owned(), session_config(SessionMode::OneShot), 0.6, 1_000_000);
    session.bind_pane("foreman-s1");

    let (read_tx, read_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(32);
    let (stop_tx, stop_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();

    let line: Vec<u8> =
        br#"{"type":"result","cost":0.25,"message":{"usage":{"input_tokens":10,"output_tokens":20}}}"#
            .iter()
            .chain(b"\n")
            .copied()
            .collect();
    read_tx.send(line).await.expect("send chunk");

    driver.drive(&mut session, read_rx, event_tx, stop_rx, Some(done_tx)).await;
    drop(stop_tx);

    let result = done_rx.await.expect("one-shot result resolved");
    assert_eq!(result.cost, 0.25);
    assert_eq!(session.tokens().input_tokens, 10);
    assert_eq!(session.tokens().output_tokens, 20);

    while event_rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn idle_confirmed_drives_respawn_out_of_watching() {
    let adapter: Arc<dyn MultiplexerAdapter> = Arc::new(FakeAdapter::new());
    let mut driver = SessionDriver::new(adapter, ParserConfig::default(), test_respawn_config(), Duration::from_millis(30));
    let mut session = Session::new("s1".to_owned(), session_config(SessionMode::Interactive), 0.6, 1_000_000);
    session.bind_pane("foreman-s1");

    let (read_tx, read_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(32);
    let (stop_tx, stop_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        driver.drive(&mut session, read_rx, event_tx, stop_rx, None).await;
    });

    read_tx.send(b"some ordinary output\n".to_vec()).await.expect("send chunk");

    let mut saw_transition = false;
    for _ in 0..20 {
        if let Ok(Some(Event::Respawn(RespawnEvent::Transition { from, to, .. }))) =
            tokio::time::timeout(Duration::from_millis(50), event_rx.recv()).await
        {
            assert_eq!(from, RespawnState::Watching);
            assert_eq!(to, RespawnState::WaitingUpdate);
            saw_transition = true;
            break;
        }
    }
    assert!(saw_transition, "expected a respawn transition out of watching");

    drop(stop_tx);
    drop(read_tx);
    handle.await.expect("driver task panicked");
}

#[tokio::test]
async fn a_numbered_choice_line_triggers_auto_accept_after_the_confirm_delay() {
    let adapter: Arc<dyn MultiplexerAdapter> = Arc::new(FakeAdapter::new());
    let mut driver = SessionDriver::new(adapter, ParserConfig::default(), test_respawn_config(), Duration::from_secs(3600));
    let mut session = Session::new("s1".to_owned(), session_config(SessionMode::Interactive), 0.6, 1_000_000);
    session.bind_pane("foreman-s1");

    let (read_tx, read_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(32);
    let (stop_tx, stop_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        driver.drive(&mut session, read_rx, event_tx, stop_rx, None).await;
    });

    read_tx.send(b"1. Yes, proceed\n".to_vec()).await.expect("send chunk");

    let mut saw_confirm_enter = false;
    let mut saw_confirm_exit = false;
    for _ in 0..20 {
        if let Ok(Some(Event::Respawn(RespawnEvent::Transition { from, to, .. }))) =
            tokio::time::timeout(Duration::from_millis(50), event_rx.recv()).await
        {
            if to == RespawnState::AutoAcceptConfirm {
                saw_confirm_enter = true;
            }
            if from == RespawnState::AutoAcceptConfirm {
                saw_confirm_exit = true;
                break;
            }
        }
    }
    assert!(saw_confirm_enter, "expected entry into auto-accept-confirm");
    assert!(saw_confirm_exit, "expected the controller to return from auto-accept-confirm");

    drop(stop_tx);
    drop(read_tx);
    handle.await.expect("driver task panicked");
}
