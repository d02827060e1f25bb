// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY session (§4.2): one assistant subprocess running inside a
//! multiplexer pane, and the authoritative source of truth for it.

pub mod buffers;
pub mod run;
pub mod screen;
pub mod tokens;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::parsers::structured_message::ParsedMessage;
use buffers::SessionBuffers;
use tokens::TokenCounter;

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    OneShot,
    Interactive,
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Creating,
    Running,
    Idle,
    Working,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionPolicy {
    Default,
    AcceptEdits,
    BypassPermissions,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        PermissionPolicy::Default
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub name: Option<String>,
    pub color_tag: Option<String>,
    pub working_dir: std::path::PathBuf,
    pub mode: SessionMode,
    pub assistant_variant: String,
    pub model: Option<String>,
    pub permission_policy: PermissionPolicy,
    pub cpu_priority: crate::multiplexer::CpuPriority,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One session. Owns its three bounded buffers and token counters; the
/// multiplexer pane, parser pipeline, progress tracker, and respawn
/// controller live alongside it and are driven by [`run::drive_session`].
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    state: SessionState,
    pane_name: Option<String>,
    buffers: SessionBuffers,
    tokens: TokenCounter,
    last_activity_ms: u64,
}

impl Session {
    pub fn new(id: SessionId, config: SessionConfig, input_ratio: f64, auto_clear_threshold: u64) -> Self {
        Self {
            id,
            config,
            state: SessionState::Creating,
            pane_name: None,
            buffers: SessionBuffers::new(),
            tokens: TokenCounter::new(input_ratio, auto_clear_threshold),
            last_activity_ms: now_ms(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pane_name(&self) -> Option<&str> {
        self.pane_name.as_deref()
    }

    pub fn bind_pane(&mut self, pane_name: impl Into<String>) {
        self.pane_name = Some(pane_name.into());
        self.state = SessionState::Running;
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    pub fn mark_idle(&mut self) {
        if self.state != SessionState::Exited {
            self.state = SessionState::Idle;
        }
    }

    pub fn mark_working(&mut self) {
        if self.state != SessionState::Exited {
            self.state = SessionState::Working;
            self.last_activity_ms = now_ms();
        }
    }

    /// `stop()`: terminate the subprocess (caller's responsibility via the
    /// multiplexer adapter), free buffers, detach from the pane. Whether
    /// the pane itself is destroyed is a policy decision left to the
    /// supervisor.
    pub fn stop(&mut self) {
        self.state = SessionState::Exited;
        self.buffers = SessionBuffers::new();
    }

    pub fn ingest_raw(&mut self, chunk: &[u8]) {
        self.buffers.ingest_raw(chunk);
        self.last_activity_ms = now_ms();
    }

    pub fn push_message(&mut self, message: ParsedMessage) {
        self.buffers.push_message(message);
    }

    pub fn get_terminal_buffer(&self) -> Vec<u8> {
        self.buffers.get_terminal_buffer()
    }

    pub fn get_text_output(&self) -> Vec<u8> {
        self.buffers.get_text_output()
    }

    pub fn get_messages(&self) -> Vec<ParsedMessage> {
        self.buffers.get_messages()
    }

    pub fn screen_lines(&self) -> Vec<String> {
        self.buffers.screen_lines()
    }

    pub fn tokens(&self) -> &TokenCounter {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenCounter {
        &mut self.tokens
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
