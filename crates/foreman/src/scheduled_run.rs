// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled-run driver (§4.8): repeatedly executes a prompt against a
//! fresh short-lived one-shot session until a wall-clock deadline, then
//! stops on its own. One task per scheduled run; cancelling it tears down
//! whatever ephemeral session is currently in flight.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::event::{Event, EventEnvelope, ScheduledEvent};
use crate::multiplexer::MultiplexerAdapter;
use crate::session::run::SessionDriver;
use crate::session::{PermissionPolicy, Session, SessionConfig, SessionId, SessionMode};
use crate::supervisor::SupervisorDefaults;
use std::sync::Arc;

const ITERATION_DELAY: Duration = Duration::from_secs(2);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const LOG_CAP: usize = 200;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduledRunStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledLogEntry {
    pub at_ms: u64,
    pub message: String,
}

/// Snapshot of a scheduled run's state, safe to hand out to readers while
/// the driving task keeps going.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRunSnapshot {
    pub id: String,
    pub prompt: String,
    pub working_dir: PathBuf,
    pub started_at_ms: u64,
    pub end_at_ms: u64,
    pub status: ScheduledRunStatus,
    pub current_session_id: Option<SessionId>,
    pub completed_tasks: u64,
    pub cumulative_cost: f64,
    pub log: Vec<ScheduledLogEntry>,
}

impl ScheduledRunSnapshot {
    fn new(id: String, prompt: String, working_dir: PathBuf, duration: Duration) -> Self {
        let started_at_ms = now_ms();
        Self {
            id,
            prompt,
            working_dir,
            started_at_ms,
            end_at_ms: started_at_ms + duration.as_millis() as u64,
            status: ScheduledRunStatus::Running,
            current_session_id: None,
            completed_tasks: 0,
            cumulative_cost: 0.0,
            log: Vec::new(),
        }
    }

    fn push_log(&mut self, message: impl Into<String>) {
        self.log.push(ScheduledLogEntry { at_ms: now_ms(), message: message.into() });
        while self.log.len() > LOG_CAP {
            self.log.remove(0);
        }
    }

    fn minutes_remaining(&self) -> u64 {
        let now = now_ms();
        if self.end_at_ms <= now {
            0
        } else {
            (self.end_at_ms - now) / 60_000
        }
    }
}

/// Handle to a running scheduled-run task: a readable snapshot plus a stop
/// switch for cancellation.
pub struct ScheduledRunHandle {
    pub snapshot: Arc<RwLock<ScheduledRunSnapshot>>,
    stop: CancellationToken,
}

impl ScheduledRunHandle {
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

/// Spawn the loop described in §4.8: while the wall clock has not passed
/// `end_at` and the run has not been stopped, run one ephemeral one-shot
/// session through to completion, log its cost, and sleep before the next
/// iteration (longer after an error).
pub fn spawn(
    prompt: String,
    working_dir: PathBuf,
    duration: Duration,
    multiplexer: Arc<dyn MultiplexerAdapter>,
    defaults: Arc<SupervisorDefaults>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> ScheduledRunHandle {
    let id = Uuid::new_v4().to_string();
    let snapshot = Arc::new(RwLock::new(ScheduledRunSnapshot::new(id.clone(), prompt.clone(), working_dir.clone(), duration)));
    let stop = CancellationToken::new();

    let task_snapshot = snapshot.clone();
    let task_stop = stop.clone();
    tokio::spawn(async move {
        let _ = event_tx.send(Event::Scheduled(ScheduledEvent::Started).to_envelope(Some(id.clone())));
        run_loop(&id, &prompt, &working_dir, multiplexer, &defaults, &task_snapshot, &task_stop, &event_tx).await;
    });

    ScheduledRunHandle { snapshot, stop }
}

async fn run_loop(
    run_id: &str,
    prompt: &str,
    working_dir: &std::path::Path,
    multiplexer: Arc<dyn MultiplexerAdapter>,
    defaults: &SupervisorDefaults,
    snapshot: &Arc<RwLock<ScheduledRunSnapshot>>,
    stop: &CancellationToken,
    event_tx: &broadcast::Sender<EventEnvelope>,
) {
    loop {
        let (end_at_ms, still_running) = {
            let guard = snapshot.read().await;
            (guard.end_at_ms, guard.status == ScheduledRunStatus::Running)
        };
        if !still_running || now_ms() > end_at_ms || stop.is_cancelled() {
            break;
        }

        let minutes_remaining = snapshot.read().await.minutes_remaining();
        let iteration_prompt = format!("{prompt}\n\napproximately {minutes_remaining} minutes remaining");

        match run_one_shot(run_id, &iteration_prompt, working_dir, multiplexer.clone(), defaults, snapshot, stop).await {
            Ok(Some(result)) => {
                let mut guard = snapshot.write().await;
                guard.completed_tasks += 1;
                guard.cumulative_cost += result.cost;
                guard.push_log(format!("iteration completed, cost {:.4}", result.cost));
                drop(guard);
                let _ = event_tx.send(Event::Scheduled(ScheduledEvent::IterationCompleted { cost: result.cost }).to_envelope(Some(run_id.to_owned())));
            }
            Ok(None) => {
                // cancelled mid-iteration; the cancellation branch below handles status/logging.
            }
            Err(err) => {
                let mut guard = snapshot.write().await;
                guard.push_log(format!("iteration failed: {err}"));
                drop(guard);
                tokio::select! {
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    _ = stop.cancelled() => break,
                }
                continue;
            }
        }

        if stop.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(ITERATION_DELAY) => {}
            _ = stop.cancelled() => break,
        }
    }

    let mut guard = snapshot.write().await;
    if stop.is_cancelled() {
        guard.status = ScheduledRunStatus::Stopped;
        guard.push_log("stopped");
        drop(guard);
        let _ = event_tx.send(Event::Scheduled(ScheduledEvent::Stopped).to_envelope(Some(run_id.to_owned())));
    } else {
        guard.status = ScheduledRunStatus::Completed;
        guard.push_log("deadline reached");
        drop(guard);
        let _ = event_tx.send(Event::Scheduled(ScheduledEvent::Completed).to_envelope(Some(run_id.to_owned())));
    }
}

/// Run exactly one ephemeral one-shot session to completion (or until the
/// run is cancelled, in which case the session is torn down and `Ok(None)`
/// is returned rather than an error).
async fn run_one_shot(
    run_id: &str,
    prompt: &str,
    working_dir: &std::path::Path,
    multiplexer: Arc<dyn MultiplexerAdapter>,
    defaults: &SupervisorDefaults,
    snapshot: &Arc<RwLock<ScheduledRunSnapshot>>,
    stop: &CancellationToken,
) -> Result<Option<crate::session::run::OneShotResult>, AppError> {
    let session_id = format!("scheduled-{run_id}-{}", Uuid::new_v4());
    let pane_name = format!("foreman-{session_id}");
    let command = vec!["claude".to_owned(), "-p".to_owned(), prompt.to_owned()];

    multiplexer.create_session(&pane_name, working_dir, &command, &[], crate::multiplexer::CpuPriority::Normal)?;
    let read_rx = multiplexer.attach_read_stream(&pane_name)?;

    let config = SessionConfig {
        name: Some(session_id.clone()),
        color_tag: None,
        working_dir: working_dir.to_path_buf(),
        mode: SessionMode::OneShot,
        assistant_variant: "claude".to_owned(),
        model: None,
        permission_policy: PermissionPolicy::Default,
        cpu_priority: crate::multiplexer::CpuPriority::Normal,
    };
    let mut session = Session::new(session_id.clone(), config, defaults.token_input_ratio, defaults.token_auto_clear_threshold);
    session.bind_pane(pane_name.clone());

    snapshot.write().await.current_session_id = Some(session_id.clone());

    let mut driver = SessionDriver::new(multiplexer.clone(), defaults.parser.clone(), defaults.respawn.clone(), defaults.quiet_window);
    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(64);
    let (stop_tx, stop_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();

    let drive_handle = tokio::spawn(async move {
        driver.drive(&mut session, read_rx, event_tx, stop_rx, Some(done_tx)).await;
        while event_rx.recv().await.is_some() {}
    });

    let outcome = tokio::select! {
        result = done_rx => result.ok(),
        _ = stop.cancelled() => {
            let _ = stop_tx.send(());
            None
        }
    };

    let _ = drive_handle.await;
    let _ = multiplexer.kill(&pane_name);
    snapshot.write().await.current_session_id = None;

    Ok(outcome)
}

#[cfg(test)]
#[path = "scheduled_run_tests.rs"]
mod tests;
