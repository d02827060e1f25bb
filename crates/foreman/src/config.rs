// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Supervisor-wide configuration. Most fields double as the default
/// [`crate::respawn::RespawnConfig`] applied to a session unless that
/// session overrides them individually.
#[derive(Debug, Clone, Parser)]
#[command(name = "foreman", version, about)]
pub struct Config {
    /// HTTP port for the external collaborator surface.
    #[arg(long, env = "FOREMAN_PORT", default_value = "4700")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "FOREMAN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Directory holding `state.json` / `inner-state.json`. Defaults to
    /// `$XDG_STATE_HOME/foreman` (or `~/.local/state/foreman`).
    #[arg(long, env = "FOREMAN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Hard cap on concurrently running sessions.
    #[arg(long, env = "FOREMAN_MAX_SESSIONS", default_value = "50")]
    pub max_sessions: usize,

    /// Multiplexer backend: "tmux" (survives restarts) or "native" (does not).
    #[arg(long, env = "FOREMAN_MULTIPLEXER", default_value = "tmux")]
    pub multiplexer: String,

    /// `tmux` binary to shell out to when `multiplexer = tmux`.
    #[arg(long, env = "FOREMAN_TMUX_BIN", default_value = "tmux")]
    pub tmux_bin: String,

    /// Log format: "json" or "text".
    #[arg(long, env = "FOREMAN_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level filter.
    #[arg(long, env = "FOREMAN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Milliseconds of quiet output after a prompt glyph before idleness
    /// signal (a) fires.
    #[arg(long, env = "FOREMAN_IDLE_QUIET_MS", default_value = "2000")]
    pub idle_quiet_ms: u64,

    /// Initial completion-confirm timer before the adaptive estimator has
    /// enough samples. Preserved from observed behaviour (§9 open questions).
    #[arg(long, env = "FOREMAN_CONFIRM_INITIAL_SECS", default_value = "10")]
    pub confirm_initial_secs: u64,

    /// Minimum sample count before the p75 estimator is trusted over the
    /// initial value.
    #[arg(long, env = "FOREMAN_CONFIRM_MIN_SAMPLES", default_value = "5")]
    pub confirm_min_samples: usize,

    /// Lower bound on the adaptive completion-confirm timer.
    #[arg(long, env = "FOREMAN_CONFIRM_MIN_SECS", default_value = "5")]
    pub confirm_min_secs: u64,

    /// Upper bound on the adaptive completion-confirm timer.
    #[arg(long, env = "FOREMAN_CONFIRM_MAX_SECS", default_value = "60")]
    pub confirm_max_secs: u64,

    /// Safety buffer applied on top of the p75 observation, as a fraction
    /// (0.2 = 20%).
    #[arg(long, env = "FOREMAN_CONFIRM_BUFFER", default_value = "0.2")]
    pub confirm_buffer: f64,

    /// Default update-prompt text sent at the start of a cycle.
    #[arg(long, env = "FOREMAN_UPDATE_PROMPT", default_value = "recap")]
    pub update_prompt: String,

    /// Default kickstart-prompt text sent at the end of a cycle.
    #[arg(long, env = "FOREMAN_KICKSTART_PROMPT", default_value = "continue")]
    pub kickstart_prompt: String,

    /// Default: send the clear directive during a cycle.
    #[arg(long, env = "FOREMAN_SEND_CLEAR", default_value = "true")]
    pub send_clear: bool,

    /// Default: send the init directive during a cycle.
    #[arg(long, env = "FOREMAN_SEND_INIT", default_value = "true")]
    pub send_init: bool,

    /// Default: auto-accept approval prompts outside an elicitation dialog.
    #[arg(long, env = "FOREMAN_AUTO_ACCEPT", default_value = "false")]
    pub auto_accept: bool,

    /// Delay between the end of one cycle (kickstart write) and returning
    /// to `watching`, in milliseconds.
    #[arg(long, env = "FOREMAN_INTER_STEP_DELAY_MS", default_value = "250")]
    pub inter_step_delay_ms: u64,

    /// Token total (input + output) above which the session auto-clears at
    /// the next idle point.
    #[arg(long, env = "FOREMAN_TOKEN_AUTO_CLEAR", default_value = "100000")]
    pub token_auto_clear_threshold: u64,

    /// Fraction of an interactive-mode token total attributed to input
    /// (the remainder is output). Heuristic; see §9 open questions.
    #[arg(long, env = "FOREMAN_TOKEN_INPUT_RATIO", default_value = "0.6")]
    pub token_input_ratio: f64,

    /// Maximum number of concurrently tracked background tools per session.
    #[arg(long, env = "FOREMAN_BACKGROUND_TOOL_CAP", default_value = "20")]
    pub background_tool_cap: usize,

    /// Debounce window, in milliseconds, for the aggregate state store.
    #[arg(long, env = "FOREMAN_STATE_DEBOUNCE_MS", default_value = "500")]
    pub state_debounce_ms: u64,

    /// Minimum number of plan-version snapshots retained in history.
    #[arg(long, env = "FOREMAN_PLAN_HISTORY_CAP", default_value = "20")]
    pub plan_history_cap: usize,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_sessions == 0 {
            anyhow::bail!("--max-sessions must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.token_input_ratio) {
            anyhow::bail!("--token-input-ratio must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&self.confirm_buffer) {
            anyhow::bail!("--confirm-buffer must be between 0 and 1");
        }
        if self.confirm_min_secs > self.confirm_max_secs {
            anyhow::bail!("--confirm-min-secs must not exceed --confirm-max-secs");
        }
        if self.confirm_initial_secs < self.confirm_min_secs
            || self.confirm_initial_secs > self.confirm_max_secs
        {
            anyhow::bail!("--confirm-initial-secs must fall within [min, max]");
        }
        self.multiplexer_kind()?;
        Ok(())
    }

    pub fn multiplexer_kind(&self) -> anyhow::Result<MultiplexerKind> {
        match self.multiplexer.to_lowercase().as_str() {
            "tmux" => Ok(MultiplexerKind::Tmux),
            "native" => Ok(MultiplexerKind::Native),
            other => anyhow::bail!("unknown multiplexer backend: {other}"),
        }
    }

    /// Resolve the state directory, falling back to the XDG state home.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("foreman");
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
        PathBuf::from(home).join(".local/state/foreman")
    }
}

/// Supported multiplexer adapter backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexerKind {
    Tmux,
    Native,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
