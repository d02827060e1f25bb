// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Respawn controller (§4.5): one instance per session, driving it
//! through repeated update → clear → init → kickstart cycles so it keeps
//! making progress without a human re-prompting it.

pub mod timer;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use timer::ConfirmTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RespawnState {
    Watching,
    SendingUpdate,
    WaitingUpdate,
    SendingClear,
    WaitingClear,
    SendingInit,
    WaitingInit,
    AutoAcceptConfirm,
    Kickstart,
}

/// Abstraction over "write bytes to the session's pty", so the controller
/// can be tested without a real multiplexer adapter.
pub trait SessionWriter: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct RespawnConfig {
    pub update_prompt: String,
    pub clear_directive: String,
    pub init_directive: String,
    pub kickstart_prompt: String,
    pub accept_sequence: Vec<u8>,
    pub send_clear: bool,
    pub send_init: bool,
    pub auto_accept: bool,
    pub inter_step_delay: Duration,
    pub auto_accept_confirm_delay: Duration,
    pub confirm_initial: Duration,
    pub confirm_min: Duration,
    pub confirm_max: Duration,
    pub confirm_min_samples: usize,
    pub confirm_buffer: f64,
}

/// What happened as a result of driving the controller one step.
#[derive(Debug, Clone, PartialEq)]
pub enum RespawnOutcome {
    /// No transition; still waiting for something.
    NoOp,
    /// A transition occurred; carries the prior and new state plus a cause.
    Transitioned { from: RespawnState, to: RespawnState, cause: String },
    /// A write failed after exhausting all retries.
    Blocked { reason: String },
}

/// Outcome of a retried (or delayed) write, distinguishing a cancellation
/// from an exhausted-retries failure so callers don't surface a
/// cancellation as a `Blocked` error (§5: cancelling a cycle just returns
/// it to watching).
enum WriteOutcome {
    Written,
    Cancelled,
    Failed(String),
}

pub struct RespawnController {
    state: RespawnState,
    prior_state: RespawnState,
    config: RespawnConfig,
    timer: ConfirmTimer,
    cycle_started_at: Option<Instant>,
    stopped: bool,
    /// Races every in-flight write retry and inter-step delay (§5); swapped
    /// for a fresh token after each cancellation so later operations are
    /// not immediately cancelled too.
    cancel_token: CancellationToken,
}

impl RespawnController {
    pub fn new(config: RespawnConfig) -> Self {
        let timer = ConfirmTimer::new(
            config.confirm_initial,
            config.confirm_min,
            config.confirm_max,
            config.confirm_min_samples,
            config.confirm_buffer,
        );
        Self {
            state: RespawnState::Watching,
            prior_state: RespawnState::Watching,
            config,
            timer,
            cycle_started_at: None,
            stopped: false,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RespawnState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The confirm timer's current duration, driven by observed latency.
    pub fn confirm_timer(&self) -> Duration {
        self.timer.current()
    }

    /// `stop()`: detach the controller from the session; it emits nothing
    /// further until explicitly restarted via [`Self::restart`].
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn restart(&mut self) {
        self.stopped = false;
        self.state = RespawnState::Watching;
    }

    /// `reset()`: return to watching from any state, without stopping.
    pub fn reset(&mut self) {
        self.state = RespawnState::Watching;
        self.cycle_started_at = None;
    }

    /// `cancel()`: abort any in-flight write/confirm and return to watching.
    /// Any write retry or inter-step delay currently suspended on the old
    /// token wakes immediately with [`WriteOutcome::Cancelled`]; the token
    /// is then replaced so later operations aren't pre-cancelled.
    pub fn cancel(&mut self) {
        self.cancel_token.cancel();
        self.cancel_token = CancellationToken::new();
        self.reset();
    }

    /// An approval prompt was detected in the pane. Elicitation takes
    /// precedence: if an elicitation dialog is also present, auto-accept
    /// is suppressed and the controller stays exactly where it is.
    pub fn on_approval_prompt(&mut self, elicitation_present: bool) -> RespawnOutcome {
        if self.stopped || elicitation_present || !self.config.auto_accept {
            return RespawnOutcome::NoOp;
        }
        if self.state == RespawnState::AutoAcceptConfirm {
            return RespawnOutcome::NoOp;
        }
        let from = self.state;
        self.prior_state = self.state;
        self.state = RespawnState::AutoAcceptConfirm;
        RespawnOutcome::Transitioned { from, to: self.state, cause: "approval prompt detected".to_owned() }
    }

    /// After the configured confirm delay, write the accept sequence and
    /// return to whatever state preceded the approval prompt.
    pub async fn confirm_auto_accept(&mut self, writer: &mut dyn SessionWriter) -> RespawnOutcome {
        if self.stopped || self.state != RespawnState::AutoAcceptConfirm {
            return RespawnOutcome::NoOp;
        }
        let accept_sequence = self.config.accept_sequence.clone();
        match self.write_with_retry(writer, &accept_sequence).await {
            WriteOutcome::Written => {
                let from = self.state;
                self.state = self.prior_state;
                RespawnOutcome::Transitioned { from, to: self.state, cause: "auto-accept confirmed".to_owned() }
            }
            WriteOutcome::Cancelled => {
                self.state = RespawnState::Watching;
                RespawnOutcome::NoOp
            }
            WriteOutcome::Failed(reason) => {
                self.state = RespawnState::Watching;
                RespawnOutcome::Blocked { reason }
            }
        }
    }

    /// Idle has been confirmed (one of the four §4.3 signals plus the
    /// elapsed confirm timer). Drive the state machine one step forward.
    ///
    /// Every suspension point here (write retries, the inter-step delay) is
    /// raced against [`Self::cancel`]'s token (§5), so an async caller can
    /// cancel this in-flight future without blocking its executor thread.
    pub async fn on_idle_confirmed(&mut self, writer: &mut dyn SessionWriter) -> RespawnOutcome {
        if self.stopped {
            return RespawnOutcome::NoOp;
        }
        match self.state {
            RespawnState::Watching => self.begin_cycle(writer).await,
            RespawnState::WaitingUpdate => self.advance_past_update(writer).await,
            RespawnState::WaitingClear => self.advance_past_clear(writer).await,
            RespawnState::WaitingInit => self.advance_past_init(writer).await,
            RespawnState::Kickstart => self.finish_cycle().await,
            _ => RespawnOutcome::NoOp,
        }
    }

    async fn begin_cycle(&mut self, writer: &mut dyn SessionWriter) -> RespawnOutcome {
        self.cycle_started_at = Some(Instant::now());
        let prompt = self.config.update_prompt.clone().into_bytes();
        self.transition_with_write(writer, RespawnState::SendingUpdate, RespawnState::WaitingUpdate, &prompt, "idle confirmed")
            .await
    }

    async fn advance_past_update(&mut self, writer: &mut dyn SessionWriter) -> RespawnOutcome {
        if self.config.send_clear {
            let directive = self.config.clear_directive.clone().into_bytes();
            self.transition_with_write(writer, RespawnState::SendingClear, RespawnState::WaitingClear, &directive, "idle confirmed, sendClear")
                .await
        } else {
            self.advance_past_clear(writer).await
        }
    }

    async fn advance_past_clear(&mut self, writer: &mut dyn SessionWriter) -> RespawnOutcome {
        if self.config.send_init {
            let directive = self.config.init_directive.clone().into_bytes();
            self.transition_with_write(writer, RespawnState::SendingInit, RespawnState::WaitingInit, &directive, "idle confirmed, sendInit")
                .await
        } else {
            self.advance_past_init(writer).await
        }
    }

    async fn advance_past_init(&mut self, writer: &mut dyn SessionWriter) -> RespawnOutcome {
        let prompt = self.config.kickstart_prompt.clone().into_bytes();
        self.transition_with_write(writer, RespawnState::Kickstart, RespawnState::Kickstart, &prompt, "idle confirmed")
            .await
    }

    async fn finish_cycle(&mut self) -> RespawnOutcome {
        tokio::select! {
            _ = tokio::time::sleep(self.config.inter_step_delay) => {}
            _ = self.cancel_token.cancelled() => return RespawnOutcome::NoOp,
        }
        if let Some(started) = self.cycle_started_at.take() {
            self.timer.record_observed_latency(started.elapsed());
        }
        let from = self.state;
        self.state = RespawnState::Watching;
        RespawnOutcome::Transitioned { from, to: self.state, cause: "inter-step delay elapsed".to_owned() }
    }

    async fn transition_with_write(
        &mut self,
        writer: &mut dyn SessionWriter,
        sending: RespawnState,
        waiting_or_kickstart: RespawnState,
        data: &[u8],
        cause: &str,
    ) -> RespawnOutcome {
        let from = self.state;
        self.state = sending;
        match self.write_with_retry(writer, data).await {
            WriteOutcome::Written => {
                self.state = waiting_or_kickstart;
                RespawnOutcome::Transitioned { from, to: self.state, cause: cause.to_owned() }
            }
            WriteOutcome::Cancelled => {
                self.state = RespawnState::Watching;
                RespawnOutcome::NoOp
            }
            WriteOutcome::Failed(reason) => {
                self.state = RespawnState::Watching;
                RespawnOutcome::Blocked { reason }
            }
        }
    }

    /// The first attempt plus at most three retries, backing off 100ms,
    /// 300ms, then 1s between attempts. Each backoff wait is raced against
    /// [`Self::cancel`]'s token so a cancelled cycle doesn't keep the
    /// executor thread parked in a retry it no longer needs.
    async fn write_with_retry(&self, writer: &mut dyn SessionWriter, data: &[u8]) -> WriteOutcome {
        const BACKOFFS_MS: [u64; 3] = [100, 300, 1000];
        if self.cancel_token.is_cancelled() {
            return WriteOutcome::Cancelled;
        }
        let mut last_error = None;
        for attempt in 0..=BACKOFFS_MS.len() {
            match writer.write(data) {
                Ok(()) => return WriteOutcome::Written,
                Err(err) => {
                    last_error = Some(err.to_string());
                    if attempt < BACKOFFS_MS.len() {
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_millis(BACKOFFS_MS[attempt])) => {}
                            _ = self.cancel_token.cancelled() => return WriteOutcome::Cancelled,
                        }
                    }
                }
            }
        }
        WriteOutcome::Failed(last_error.unwrap_or_else(|| "write failed".to_owned()))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
