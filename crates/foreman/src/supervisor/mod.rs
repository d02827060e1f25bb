// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor (§4.6): owns the session table, mediates every external
//! operation against it, persists state, enforces the concurrent-session
//! cap, fans events out to subscribers, and isolates a crash in one
//! session's task from every other session.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, ErrorCode};
use crate::event::{Event, EventEnvelope, PlanEvent, RespawnEvent, SessionEvent};
use crate::multiplexer::{MultiplexerAdapter, PaneRegistry};
use crate::parsers::ParserConfig;
use crate::progress::plan::TodoItem;
use crate::respawn::{RespawnConfig, RespawnState};
use crate::scheduled_run::{self, ScheduledRunHandle, ScheduledRunSnapshot};
use crate::session::run::SessionDriver;
use crate::session::{Session, SessionConfig, SessionId, SessionMode, SessionState};
use store::{PersistedRespawnConfig, SessionRecord, StateStore};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const SESSION_EVENT_CHANNEL_CAPACITY: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn epoch_day() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() / 86_400
}

/// Request to create a new session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub config: SessionConfig,
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub completion_phrase: Option<String>,
    pub respawn: Option<RespawnConfig>,
}

/// Cheap, frequently-refreshed view of a running session, rebuilt from the
/// event stream rather than sharing live access to the session object
/// (which is exclusively owned by its driver task for the task's lifetime).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub respawn_state: RespawnState,
    pub last_activity_ms: u64,
    pub last_completion: Option<String>,
    pub last_cost: f64,
    pub todos: Vec<TodoItem>,
}

impl SessionSnapshot {
    fn new() -> Self {
        Self {
            state: SessionState::Creating,
            respawn_state: RespawnState::Watching,
            last_activity_ms: now_ms(),
            last_completion: None,
            last_cost: 0.0,
            todos: Vec::new(),
        }
    }

    fn apply(&mut self, event: &Event) {
        self.last_activity_ms = now_ms();
        match event {
            Event::Session(SessionEvent::Working) => self.state = SessionState::Working,
            Event::Session(SessionEvent::Idle) => self.state = SessionState::Idle,
            Event::Session(SessionEvent::Exit { .. }) => self.state = SessionState::Exited,
            Event::Session(SessionEvent::Completion { text, cost }) => {
                self.last_completion = Some(text.clone());
                self.last_cost = *cost;
            }
            Event::Respawn(RespawnEvent::Transition { to, .. }) => self.respawn_state = *to,
            Event::Plan(PlanEvent::TodoUpsert { item }) => {
                match self.todos.iter_mut().find(|t| t.id == item.id) {
                    Some(existing) => *existing = item.clone(),
                    None => self.todos.push(item.clone()),
                }
            }
            _ => {}
        }
    }
}

struct SessionEntry {
    pane_name: String,
    config: SessionConfig,
    respawn: PersistedRespawnConfig,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    stop_tx: Option<oneshot::Sender<()>>,
    created_at_ms: u64,
}

/// Tunables threaded into every session's driver and respawn controller,
/// derived once from [`Config`].
pub struct SupervisorDefaults {
    pub parser: ParserConfig,
    pub respawn: RespawnConfig,
    pub quiet_window: Duration,
    pub token_input_ratio: f64,
    pub token_auto_clear_threshold: u64,
    pub completion_phrase: String,
}

impl SupervisorDefaults {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parser: ParserConfig {
                completion_phrase: "RALPH_DONE".to_owned(),
                background_tool_cap: config.background_tool_cap,
                completed_tool_ttl: Duration::from_secs(2),
                suggestion_tool_ttl: Duration::from_secs(30),
                log_path_tool_ttl: Duration::from_secs(60),
            },
            respawn: RespawnConfig {
                update_prompt: config.update_prompt.clone(),
                clear_directive: "/clear\r".to_owned(),
                init_directive: "/init\r".to_owned(),
                kickstart_prompt: config.kickstart_prompt.clone(),
                accept_sequence: b"1\r".to_vec(),
                send_clear: config.send_clear,
                send_init: config.send_init,
                auto_accept: config.auto_accept,
                inter_step_delay: Duration::from_millis(config.inter_step_delay_ms),
                auto_accept_confirm_delay: Duration::from_millis(1500),
                confirm_initial: Duration::from_secs(config.confirm_initial_secs),
                confirm_min: Duration::from_secs(config.confirm_min_secs),
                confirm_max: Duration::from_secs(config.confirm_max_secs),
                confirm_min_samples: config.confirm_min_samples,
                confirm_buffer: config.confirm_buffer,
            },
            quiet_window: Duration::from_millis(config.idle_quiet_ms),
            token_input_ratio: config.token_input_ratio,
            token_auto_clear_threshold: config.token_auto_clear_threshold,
            completion_phrase: "RALPH_DONE".to_owned(),
        }
    }

    fn persisted_respawn(&self, overrides: Option<&RespawnConfig>) -> (RespawnConfig, PersistedRespawnConfig) {
        let cfg = overrides.cloned().unwrap_or_else(|| self.respawn.clone());
        let persisted = PersistedRespawnConfig {
            update_prompt: cfg.update_prompt.clone(),
            clear_directive: cfg.clear_directive.clone(),
            init_directive: cfg.init_directive.clone(),
            kickstart_prompt: cfg.kickstart_prompt.clone(),
            send_clear: cfg.send_clear,
            send_init: cfg.send_init,
            auto_accept: cfg.auto_accept,
            inter_step_delay_ms: cfg.inter_step_delay.as_millis() as u64,
            auto_accept_confirm_delay_ms: cfg.auto_accept_confirm_delay.as_millis() as u64,
            confirm_initial_secs: cfg.confirm_initial.as_secs(),
            confirm_min_secs: cfg.confirm_min.as_secs(),
            confirm_max_secs: cfg.confirm_max.as_secs(),
            confirm_min_samples: cfg.confirm_min_samples,
            confirm_buffer: cfg.confirm_buffer,
        };
        (cfg, persisted)
    }
}

/// Every field a spawned background task might need to outlive the method
/// call that spawned it is already `Arc`-wrapped, so no method here needs
/// `Arc<Self>` access — plain `&self` clones what it needs before spawning.
pub struct Supervisor {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    scheduled_runs: Arc<RwLock<HashMap<String, ScheduledRunHandle>>>,
    multiplexer: Arc<dyn MultiplexerAdapter>,
    pane_registry: PaneRegistry,
    store: Arc<StateStore>,
    defaults: Arc<SupervisorDefaults>,
    max_sessions: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(config: &Config, multiplexer: Arc<dyn MultiplexerAdapter>) -> Self {
        let state_dir = config.resolved_state_dir();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            scheduled_runs: Arc::new(RwLock::new(HashMap::new())),
            pane_registry: PaneRegistry::new(&state_dir),
            store: StateStore::load(&state_dir, Duration::from_millis(config.state_debounce_ms)),
            defaults: Arc::new(SupervisorDefaults::from_config(config)),
            max_sessions: config.max_sessions,
            multiplexer,
            event_tx,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn snapshot(&self, id: &str) -> Result<SessionSnapshot, AppError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or_else(|| AppError::not_found(format!("no session {id}")))?;
        let result = entry.snapshot.read().await.clone();
        Ok(result)
    }

    pub async fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Start a scheduled run (§4.8) and register it in the scheduled-run
    /// table alongside the session table.
    pub async fn start_scheduled_run(&self, prompt: String, working_dir: std::path::PathBuf, duration: Duration) -> String {
        let handle = scheduled_run::spawn(prompt, working_dir, duration, self.multiplexer.clone(), self.defaults.clone(), self.event_tx.clone());
        let id = handle.snapshot.read().await.id.clone();
        self.scheduled_runs.write().await.insert(id.clone(), handle);
        id
    }

    pub async fn scheduled_run_snapshot(&self, id: &str) -> Result<ScheduledRunSnapshot, AppError> {
        let runs = self.scheduled_runs.read().await;
        let handle = runs.get(id).ok_or_else(|| AppError::not_found(format!("no scheduled run {id}")))?;
        let result = handle.snapshot.read().await.clone();
        Ok(result)
    }

    pub async fn list_scheduled_runs(&self) -> Vec<String> {
        self.scheduled_runs.read().await.keys().cloned().collect()
    }

    pub async fn stop_scheduled_run(&self, id: &str) -> Result<(), AppError> {
        let runs = self.scheduled_runs.read().await;
        let handle = runs.get(id).ok_or_else(|| AppError::not_found(format!("no scheduled run {id}")))?;
        handle.stop();
        Ok(())
    }

    /// Startup reconciliation (§4.6): rebind every persisted session whose
    /// multiplexer pane still exists with no subprocess respawn; sessions
    /// whose pane is gone are simply not rebound (left for cleanup on a
    /// future explicit request).
    pub async fn reconcile(&self) -> Result<(), AppError> {
        let mapping = self.pane_registry.load();
        let state = self.store.snapshot().await;
        for (id, pane_name) in mapping {
            let Some(record) = state.sessions.get(&id) else { continue };
            if !self.multiplexer.exists(&pane_name).unwrap_or(false) {
                tracing::warn!(session = %id, pane = %pane_name, "persisted pane is gone, not rebinding");
                continue;
            }
            if let Err(err) = self.rebind(record.clone(), pane_name).await {
                tracing::error!(session = %id, error = %err, "failed to rebind persisted session");
            }
        }
        Ok(())
    }

    async fn rebind(&self, record: SessionRecord, pane_name: String) -> Result<(), AppError> {
        if self.sessions.read().await.len() >= self.max_sessions {
            return Err(AppError::resource_exhausted("concurrent session cap reached during reconciliation"));
        }
        let read_rx = self.multiplexer.attach_read_stream(&pane_name)?;
        let mut session = Session::new(
            record.id.clone(),
            record.config.clone(),
            self.defaults.token_input_ratio,
            self.defaults.token_auto_clear_threshold,
        );
        session.bind_pane(pane_name.clone());
        let respawn = rebuild_respawn_config(&record.respawn);
        self.spawn_driver(record.id.clone(), pane_name, record.config, respawn, record.respawn, session, read_rx, None)
            .await;
        Ok(())
    }

    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<SessionId, AppError> {
        if self.sessions.read().await.len() >= self.max_sessions {
            return Err(AppError::resource_exhausted(format!("concurrent session cap of {} reached", self.max_sessions)));
        }
        let id = Uuid::new_v4().to_string();
        let pane_name = format!("foreman-{id}");
        self.multiplexer.create_session(&pane_name, &request.config.working_dir, &request.command, &request.env, request.config.cpu_priority)?;
        let read_rx = self.multiplexer.attach_read_stream(&pane_name)?;

        let mut session = Session::new(id.clone(), request.config.clone(), self.defaults.token_input_ratio, self.defaults.token_auto_clear_threshold);
        session.bind_pane(pane_name.clone());

        let (respawn_cfg, persisted_respawn) = self.defaults.persisted_respawn(request.respawn.as_ref());
        let completion_phrase = if matches!(request.config.mode, SessionMode::Interactive) {
            Some(request.completion_phrase.unwrap_or_else(|| self.defaults.completion_phrase.clone()))
        } else {
            None
        };

        self.spawn_driver(id.clone(), pane_name.clone(), request.config, respawn_cfg, persisted_respawn, session, read_rx, completion_phrase)
            .await;

        let mut mapping = self.pane_registry.load();
        mapping.insert(id.clone(), pane_name);
        let _ = self.pane_registry.save(&mapping);

        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn spawn_driver(
        &self,
        id: SessionId,
        pane_name: String,
        config: SessionConfig,
        respawn_cfg: RespawnConfig,
        persisted_respawn: PersistedRespawnConfig,
        mut session: Session,
        read_rx: mpsc::Receiver<crate::multiplexer::ReadChunk>,
        completion_phrase: Option<String>,
    ) {
        let mut driver = SessionDriver::new(self.multiplexer.clone(), self.defaults.parser.clone(), respawn_cfg, self.defaults.quiet_window);
        if let Some(phrase) = completion_phrase {
            driver.start_loop(phrase);
        }

        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let snapshot = Arc::new(RwLock::new(SessionSnapshot::new()));

        self.spawn_forwarder(id.clone(), event_rx, snapshot.clone());

        let drive_handle = tokio::spawn(async move {
            driver.drive(&mut session, read_rx, event_tx, stop_rx, None).await;
        });
        self.spawn_reaper(id.clone(), drive_handle, snapshot.clone());

        self.sessions.write().await.insert(
            id.clone(),
            SessionEntry {
                pane_name,
                config: config.clone(),
                respawn: persisted_respawn.clone(),
                snapshot,
                stop_tx: Some(stop_tx),
                created_at_ms: now_ms(),
            },
        );

        self.store
            .upsert_session(SessionRecord {
                id,
                config,
                pane_name: String::new(),
                respawn: persisted_respawn,
                todos: Vec::new(),
                created_at_ms: now_ms(),
            })
            .await;
    }

    /// Forward every event onto the broadcast channel (tagged with the
    /// session id) and fold it into the session's cached snapshot.
    fn spawn_forwarder(
        &self,
        id: SessionId,
        mut event_rx: mpsc::Receiver<Event>,
        snapshot: Arc<RwLock<SessionSnapshot>>,
    ) {
        let event_tx = self.event_tx.clone();
        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        let Some(event) = event else { break };
                        if let Event::Session(SessionEvent::Completion { cost, .. }) = &event {
                            store.record_usage(epoch_day(), 0, 0, *cost).await;
                        }
                        snapshot.write().await.apply(&event);
                        store.set_session_state(&id, format!("{:?}", snapshot.read().await.state)).await;
                        let _ = event_tx.send(event.to_envelope(Some(id.clone())));
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    /// Await the driver task and swallow any panic (§4.6 crash isolation):
    /// log it, mark the session exited, and remove it from the table so a
    /// failure in one session never propagates to another.
    fn spawn_reaper(
        &self,
        id: SessionId,
        drive_handle: tokio::task::JoinHandle<()>,
        snapshot: Arc<RwLock<SessionSnapshot>>,
    ) {
        let sessions = self.sessions.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(err) = drive_handle.await {
                tracing::error!(session = %id, error = %err, "session driver task terminated abnormally");
            }
            snapshot.write().await.state = SessionState::Exited;
            sessions.write().await.remove(&id);
            store.remove_session(&id).await;
        });
    }

    /// Send raw bytes into a session's pane, bypassing the respawn
    /// controller (used for direct human/collaborator input).
    pub async fn write_input(&self, id: &str, data: &[u8]) -> Result<(), AppError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or_else(|| AppError::not_found(format!("no session {id}")))?;
        self.multiplexer.write(&entry.pane_name, data)
    }

    pub async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), AppError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id).ok_or_else(|| AppError::not_found(format!("no session {id}")))?;
        self.multiplexer.resize(&entry.pane_name, cols, rows)
    }

    /// Stop a session's driver task; the pane itself is left running so a
    /// later reconciliation can still find it.
    pub async fn stop_session(&self, id: &str) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id).ok_or_else(|| AppError::not_found(format!("no session {id}")))?;
        if let Some(stop_tx) = entry.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        Ok(())
    }

    /// Stop the session's driver AND kill its multiplexer pane outright.
    pub async fn terminate_session(&self, id: &str) -> Result<(), AppError> {
        self.stop_session(id).await?;
        let pane_name = {
            let sessions = self.sessions.read().await;
            sessions.get(id).map(|entry| entry.pane_name.clone())
        };
        if let Some(pane_name) = pane_name {
            self.multiplexer.kill(&pane_name)?;
        }
        let mut mapping = self.pane_registry.load();
        mapping.remove(id);
        let _ = self.pane_registry.save(&mapping);
        Ok(())
    }

    /// Shut down every session's driver in parallel, wait up to the grace
    /// period, then force-release by dropping remaining state. Multiplexer
    /// panes are left running (§4.6).
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.shutdown.cancel();
        for handle in self.scheduled_runs.read().await.values() {
            handle.stop();
        }
        let ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        for id in &ids {
            let _ = self.stop_session(id).await;
        }
        let deadline = tokio::time::sleep(SHUTDOWN_GRACE);
        tokio::pin!(deadline);
        loop {
            if self.sessions.read().await.is_empty() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                _ = &mut deadline => {
                    tracing::warn!(remaining = self.sessions.read().await.len(), "shutdown grace period elapsed, force-releasing");
                    break;
                }
            }
        }
        self.store.force_flush().await
    }

    pub fn error_for_busy(&self) -> AppError {
        AppError::new(ErrorCode::SessionBusy, "an exclusive operation is already in flight for this session")
    }
}

fn rebuild_respawn_config(persisted: &PersistedRespawnConfig) -> RespawnConfig {
    RespawnConfig {
        update_prompt: persisted.update_prompt.clone(),
        clear_directive: persisted.clear_directive.clone(),
        init_directive: persisted.init_directive.clone(),
        kickstart_prompt: persisted.kickstart_prompt.clone(),
        accept_sequence: b"1\r".to_vec(),
        send_clear: persisted.send_clear,
        send_init: persisted.send_init,
        auto_accept: persisted.auto_accept,
        inter_step_delay: Duration::from_millis(persisted.inter_step_delay_ms),
        auto_accept_confirm_delay: Duration::from_millis(persisted.auto_accept_confirm_delay_ms),
        confirm_initial: Duration::from_secs(persisted.confirm_initial_secs),
        confirm_min: Duration::from_secs(persisted.confirm_min_secs),
        confirm_max: Duration::from_secs(persisted.confirm_max_secs),
        confirm_min_samples: persisted.confirm_min_samples,
        confirm_buffer: persisted.confirm_buffer,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
