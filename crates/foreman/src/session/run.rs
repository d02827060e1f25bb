// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session driver (§4.2, §4.5, §4.6): the task that owns a session's
//! live I/O. Reads raw bytes from the bound pane, runs them through the
//! parser pipeline and progress tracker, drives the respawn controller,
//! and batches the resulting events for the supervisor's fan-out. One
//! driver per running session; nothing it observes can fail the stream —
//! malformed input is skipped, never propagated (§7).

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

use crate::error::AppError;
use crate::event::{Event, PlanEvent, RespawnEvent, SessionEvent, ToolEvent};
use crate::multiplexer::{MultiplexerAdapter, ReadChunk};
use crate::parsers::background_tool::BackgroundToolEvent;
use crate::parsers::structured_message::ParsedMessage;
use crate::parsers::{strip_ansi, ParserConfig, ParserEvent, ParserPipeline};
use crate::progress::plan::{Priority, TodoPatch};
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::respawn::{RespawnConfig, RespawnController, RespawnOutcome, RespawnState, SessionWriter};

use super::Session;

const EVENT_BATCH_WINDOW: Duration = Duration::from_millis(16);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(200);
const TOOL_EXPIRE_INTERVAL: Duration = Duration::from_secs(5);
const PROGRESS_HISTORY_CAP: usize = 200;

/// A numbered-choice line such as `1. Yes` or `❯ 2) No` (§4.5 glossary:
/// approval prompt).
fn numbered_choice_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[❯>]\s*)?[1-9]\d*[.)]\s+\S").expect("static regex is valid"))
}

/// A free-form question the numbered-choice pattern does not cover.
fn elicitation_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?\s*$").expect("static regex is valid"))
}

/// The outcome of a completed `start-one-shot` session: the assistant's
/// final answer text and its reported cost.
#[derive(Debug, Clone)]
pub struct OneShotResult {
    pub text: String,
    pub cost: f64,
}

/// Writes bytes to a bound pane through its multiplexer adapter.
struct PaneWriter {
    multiplexer: Arc<dyn MultiplexerAdapter>,
    pane_name: String,
}

impl SessionWriter for PaneWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), AppError> {
        self.multiplexer.write(&self.pane_name, data)
    }
}

/// Owns the parser pipeline, progress tracker, and respawn controller for
/// one session, and drives them from its raw byte stream.
pub struct SessionDriver {
    multiplexer: Arc<dyn MultiplexerAdapter>,
    pipeline: ParserPipeline,
    progress: ProgressTracker,
    respawn: RespawnController,
    quiet_window: Duration,
    auto_accept_confirm_delay: Duration,
    elicitation_open: bool,
    approval_confirm_deadline: Option<Instant>,
    line_carry: Vec<u8>,
    terminal_offset: u64,
    todo_id_map: HashMap<String, String>,
}

impl SessionDriver {
    pub fn new(
        multiplexer: Arc<dyn MultiplexerAdapter>,
        parser_config: ParserConfig,
        respawn_config: RespawnConfig,
        quiet_window: Duration,
    ) -> Self {
        let auto_accept_confirm_delay = respawn_config.auto_accept_confirm_delay;
        Self {
            multiplexer,
            pipeline: ParserPipeline::new(parser_config),
            progress: ProgressTracker::new(PROGRESS_HISTORY_CAP),
            respawn: RespawnController::new(respawn_config),
            quiet_window,
            auto_accept_confirm_delay,
            elicitation_open: false,
            approval_confirm_deadline: None,
            line_carry: Vec::new(),
            terminal_offset: 0,
            todo_id_map: HashMap::new(),
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut ProgressTracker {
        &mut self.progress
    }

    pub fn respawn(&self) -> &RespawnController {
        &self.respawn
    }

    pub fn respawn_mut(&mut self) -> &mut RespawnController {
        &mut self.respawn
    }

    /// Arm the progress tracker and respawn controller for an interactive
    /// Ralph loop, and start the respawn controller watching.
    pub fn start_loop(&mut self, completion_phrase: impl Into<String>) {
        self.progress.start_loop(completion_phrase);
        self.respawn.restart();
    }

    /// Drive the session until its pane's read stream closes or `stop_rx`
    /// fires. If `one_shot_done` is set, it is fulfilled the moment a
    /// `result` message arrives and the loop returns immediately after.
    pub async fn drive(
        &mut self,
        session: &mut Session,
        mut read_rx: mpsc::Receiver<ReadChunk>,
        event_tx: mpsc::Sender<Event>,
        stop_rx: oneshot::Receiver<()>,
        mut one_shot_done: Option<oneshot::Sender<OneShotResult>>,
    ) {
        let Some(pane_name) = session.pane_name().map(str::to_owned) else {
            return;
        };
        let mut writer = PaneWriter { multiplexer: self.multiplexer.clone(), pane_name };
        let mut pending: Vec<Event> = Vec::new();

        let mut batch = interval(EVENT_BATCH_WINDOW);
        batch.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_poll = interval(IDLE_POLL_INTERVAL);
        idle_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tool_expire = interval(TOOL_EXPIRE_INTERVAL);
        tool_expire.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop_rx);

        loop {
            tokio::select! {
                chunk = read_rx.recv() => {
                    match chunk {
                        Some(bytes) => {
                            if let Some(result) = self.on_chunk(session, &bytes, &mut pending) {
                                if let Some(tx) = one_shot_done.take() {
                                    let _ = tx.send(result);
                                }
                                flush_batch(&event_tx, &mut pending).await;
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = idle_poll.tick() => self.on_idle_tick(&mut writer, &mut pending).await,
                _ = tool_expire.tick() => {
                    for event in self.pipeline.expire_tools() {
                        pending.push(tool_event_to_event(event));
                    }
                }
                _ = batch.tick() => flush_batch(&event_tx, &mut pending).await,
                _ = &mut stop_rx => break,
            }
        }

        if !self.line_carry.is_empty() {
            let line = strip_ansi(&String::from_utf8_lossy(&self.line_carry));
            self.line_carry.clear();
            self.process_line_for_progress(&line, &mut pending);
        }
        for event in self.pipeline.flush() {
            self.on_parser_event(event, session, &mut pending);
        }
        flush_batch(&event_tx, &mut pending).await;
    }

    /// Feed one chunk through every consumer. Returns a one-shot result if
    /// this chunk contained the session's terminal `result` message.
    fn on_chunk(&mut self, session: &mut Session, bytes: &[u8], pending: &mut Vec<Event>) -> Option<OneShotResult> {
        session.ingest_raw(bytes);
        self.pipeline.observe_screen(&session.screen_lines());
        pending.push(Event::Session(SessionEvent::Output { offset: self.terminal_offset, len: bytes.len() }));
        self.terminal_offset += bytes.len() as u64;

        let mut one_shot_result = None;
        for event in self.pipeline.feed(bytes) {
            if let ParserEvent::Message(ParsedMessage::Result { cost, message }) = &event {
                let cost = cost.unwrap_or(0.0);
                if let Some(usage) = message.as_ref().and_then(|m| m.usage.as_ref()) {
                    session.tokens_mut().record_exact(usage.input_tokens, usage.output_tokens, cost);
                }
                one_shot_result = Some(OneShotResult { text: extract_result_text(session), cost });
            }
            self.on_parser_event(event, session, pending);
        }

        self.line_carry.extend_from_slice(bytes);
        while let Some(pos) = self.line_carry.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.line_carry.drain(..=pos).collect();
            let raw = String::from_utf8_lossy(&line_bytes);
            let line = strip_ansi(raw.trim_end_matches(['\r', '\n']));
            self.process_line_for_progress(&line, pending);
            self.apply_approval_and_elicitation(&line, pending);
            if let Some(total) = crate::session::tokens::parse_status_line_tokens(&line) {
                session.tokens_mut().record_status_line_total(total);
                if session.tokens().exceeds_auto_clear_threshold() {
                    pending.push(Event::Session(SessionEvent::AutoClear));
                    session.tokens_mut().reset();
                }
            }
        }
        one_shot_result
    }

    /// Both branches here may suspend on a write retry or the respawn
    /// controller's inter-step delay; both are cancellable (§5) so this
    /// being async never stalls the rest of the driver's select loop.
    async fn on_idle_tick(&mut self, writer: &mut PaneWriter, pending: &mut Vec<Event>) {
        if let Some(deadline) = self.approval_confirm_deadline {
            if Instant::now() >= deadline {
                self.approval_confirm_deadline = None;
                let outcome = self.respawn.confirm_auto_accept(writer).await;
                self.apply_respawn_outcome(outcome, pending);
            }
            return;
        }
        // §4.5/§9: the adaptive confirm timer drives idle confirmation, with
        // the static quiet window kept as a floor so a timer that has not
        // yet accumulated enough samples can't confirm idleness faster than
        // the configured minimum.
        let quiet = self.respawn.confirm_timer().max(self.quiet_window);
        if self.pipeline.idle_candidate(quiet).is_some() {
            let outcome = self.respawn.on_idle_confirmed(writer).await;
            self.apply_respawn_outcome(outcome, pending);
        }
    }

    fn apply_approval_and_elicitation(&mut self, line: &str, pending: &mut Vec<Event>) {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            self.elicitation_open = elicitation_line_re().is_match(trimmed) && !numbered_choice_re().is_match(trimmed);
        }
        if numbered_choice_re().is_match(line) {
            let outcome = self.respawn.on_approval_prompt(self.elicitation_open);
            let became_confirm = self.respawn.state() == RespawnState::AutoAcceptConfirm;
            self.apply_respawn_outcome(outcome, pending);
            if became_confirm {
                self.approval_confirm_deadline = Some(Instant::now() + self.auto_accept_confirm_delay);
            }
        }
    }

    fn apply_respawn_outcome(&mut self, outcome: RespawnOutcome, pending: &mut Vec<Event>) {
        match outcome {
            RespawnOutcome::NoOp => {}
            RespawnOutcome::Transitioned { from, to, cause } => {
                pending.push(Event::Respawn(RespawnEvent::Transition { from, to, cause }));
            }
            RespawnOutcome::Blocked { reason } => {
                pending.push(Event::Respawn(RespawnEvent::Blocked { reason }));
            }
        }
    }

    fn process_line_for_progress(&mut self, line: &str, pending: &mut Vec<Event>) {
        for event in self.progress.observe_line(line) {
            match event {
                ProgressEvent::Enabled => pending.push(Event::Plan(PlanEvent::Enabled)),
                ProgressEvent::TodoUpsert(upsert) => self.apply_todo_upsert(upsert, pending),
                ProgressEvent::StatusBlock(block) => pending.push(Event::Plan(PlanEvent::StatusBlock { block })),
                ProgressEvent::CircuitBreakerUpdate(transition) => {
                    let state = transition.to;
                    pending.push(Event::Plan(PlanEvent::CircuitBreakerUpdate { state, transition }));
                }
                ProgressEvent::CompletionDetected(phrase) => {
                    pending.push(Event::Plan(PlanEvent::CompletionDetected { phrase }));
                }
            }
        }
    }

    /// Reconcile a line-level todo upsert (keyed by a content-hash id)
    /// against the plan's own sequentially-assigned ids.
    fn apply_todo_upsert(&mut self, upsert: crate::parsers::todo_line::TodoUpsert, pending: &mut Vec<Event>) {
        let plan_id = match self.todo_id_map.get(&upsert.id) {
            Some(id) => id.clone(),
            None => {
                let id = self.progress.add_todo(upsert.text.clone(), Priority::P1, None);
                self.todo_id_map.insert(upsert.id.clone(), id.clone());
                id
            }
        };
        let patch = TodoPatch {
            text: Some(upsert.text.clone()),
            status: Some(upsert.status),
            ..Default::default()
        };
        if self.progress.update_todo(&plan_id, patch).is_ok() {
            if let Some(item) = self.progress.todos().iter().find(|t| t.id == plan_id).cloned() {
                pending.push(Event::Plan(PlanEvent::TodoUpsert { item }));
            }
        }
    }

    fn on_parser_event(&mut self, event: ParserEvent, session: &mut Session, pending: &mut Vec<Event>) {
        match event {
            ParserEvent::Message(message) => {
                session.push_message(message.clone());
                pending.push(Event::Session(SessionEvent::Message { message }));
            }
            ParserEvent::CompletionDetected(phrase) => {
                if self.progress.is_complete() {
                    pending.push(Event::Session(SessionEvent::Completion { text: phrase, cost: session.tokens().cost }));
                }
            }
            ParserEvent::Tool(tool_event) => pending.push(tool_event_to_event(tool_event)),
            // The progress tracker runs its own status-block and todo-line
            // detectors from the full line stream; these raw-line echoes
            // from the general pipeline are redundant for event purposes.
            ParserEvent::Idle(_) | ParserEvent::StatusBlock(_) | ParserEvent::TodoUpsert(_) => {}
        }
    }
}

fn tool_event_to_event(event: BackgroundToolEvent) -> Event {
    match event {
        BackgroundToolEvent::ToolStart(tool) => Event::Tool(ToolEvent::Start { tool }),
        BackgroundToolEvent::ToolEnd { id } => Event::Tool(ToolEvent::End { id }),
        BackgroundToolEvent::ToolsUpdate(tools) => Event::Tool(ToolEvent::ToolsUpdate { tools }),
    }
}

/// Best-effort extraction of the assistant's final answer text from the
/// session's buffered messages, following the structured-output content-
/// block convention (a `message.content[].text` array).
fn extract_result_text(session: &Session) -> String {
    for message in session.get_messages().into_iter().rev() {
        if let ParsedMessage::Assistant { payload } = message {
            if let Some(text) = payload
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_array())
                .and_then(|blocks| blocks.iter().find_map(|b| b.get("text")).and_then(|t| t.as_str()))
            {
                return text.to_owned();
            }
        }
    }
    String::new()
}

/// Under backpressure, events marked [`Event::is_low_value`] are dropped
/// rather than allowed to block the session (§5); every other event is
/// delivered even if it means waiting for room in the channel.
async fn flush_batch(event_tx: &mpsc::Sender<Event>, pending: &mut Vec<Event>) {
    for event in pending.drain(..) {
        if event.is_low_value() {
            let _ = event_tx.try_send(event);
        } else if event_tx.send(event).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
