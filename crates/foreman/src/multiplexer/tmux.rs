// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tmux`-backed multiplexer adapter: the primary backend, since named
//! tmux sessions survive a supervisor restart. Every operation shells out
//! to the `tmux` binary; writes use `send-keys -l` so bytes reach the pane
//! byte-for-byte with no shell interpretation.

use std::collections::HashSet;
use std::process::{Command, Stdio};

use super::{CpuPriority, MultiplexerAdapter, ReadChunk};
use crate::error::{AppError, ErrorCode};

pub struct TmuxAdapter {
    tmux_bin: String,
}

impl TmuxAdapter {
    pub fn new(tmux_bin: impl Into<String>) -> Self {
        Self { tmux_bin: tmux_bin.into() }
    }

    /// Confirm the `tmux` binary is reachable. Called once at supervisor
    /// startup; per §4.1 this is the one place absence is fatal.
    pub fn check_available(&self) -> Result<(), AppError> {
        let status = Command::new(&self.tmux_bin)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) | Err(_) => {
                Err(AppError::new(ErrorCode::OperationFailed, format!("{} is not available", self.tmux_bin)))
            }
        }
    }

    fn cmd(&self) -> Command {
        Command::new(&self.tmux_bin)
    }

    fn run(&self, args: &[&str]) -> Result<(), AppError> {
        let status = self
            .cmd()
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| AppError::new(ErrorCode::OperationFailed, format!("tmux {args:?}: {err}")))?;
        if !status.success() {
            return Err(AppError::new(ErrorCode::OperationFailed, format!("tmux {args:?} failed")));
        }
        Ok(())
    }

    fn run_capturing(&self, args: &[&str]) -> Result<String, AppError> {
        let output = self
            .cmd()
            .args(args)
            .output()
            .map_err(|err| AppError::new(ErrorCode::OperationFailed, format!("tmux {args:?}: {err}")))?;
        if !output.status.success() {
            return Err(AppError::new(ErrorCode::OperationFailed, format!("tmux {args:?} failed")));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MultiplexerAdapter for TmuxAdapter {
    fn create_session(
        &self,
        name: &str,
        working_dir: &std::path::Path,
        command: &[String],
        env: &[(String, String)],
        cpu_priority: CpuPriority,
    ) -> Result<(), AppError> {
        if command.is_empty() {
            return Err(AppError::invalid_input("command must have at least one element"));
        }
        if self.exists(name)? {
            return Err(AppError::new(ErrorCode::AlreadyExists, format!("pane {name} already exists")));
        }
        let command_line = command.join(" ");
        let shell_command = match cpu_priority {
            CpuPriority::Low => format!("nice -n 10 {command_line}"),
            CpuPriority::Normal => command_line,
        };
        let mut cmd = self.cmd();
        cmd.args(["new-session", "-d", "-s", name, "-c"]).arg(working_dir);
        for (key, value) in env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(shell_command);
        let status = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| AppError::new(ErrorCode::OperationFailed, err.to_string()))?;
        if !status.success() {
            return Err(AppError::new(ErrorCode::OperationFailed, format!("tmux new-session {name} failed")));
        }
        Ok(())
    }

    fn attach_read_stream(&self, name: &str) -> Result<tokio::sync::mpsc::Receiver<ReadChunk>, AppError> {
        if !self.exists(name)? {
            return Err(AppError::not_found(format!("no pane named {name}")));
        }
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(poll_pane_output(self.tmux_bin.clone(), name.to_owned(), tx));
        Ok(rx)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), AppError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.run(&["send-keys", "-l", "-t", name, &text])
    }

    fn resize(&self, name: &str, cols: u16, rows: u16) -> Result<(), AppError> {
        let cols = cols.to_string();
        let rows = rows.to_string();
        self.run(&["resize-pane", "-t", name, "-x", &cols, "-y", &rows])
    }

    fn kill(&self, name: &str) -> Result<(), AppError> {
        // Idempotent: killing an already-gone session is not an error.
        let _ = self.run(&["kill-session", "-t", name]);
        Ok(())
    }

    fn list(&self) -> Result<HashSet<String>, AppError> {
        match self.run_capturing(&["list-sessions", "-F", "#{session_name}"]) {
            Ok(output) => Ok(output.lines().map(str::to_owned).collect()),
            Err(_) => Ok(HashSet::new()),
        }
    }

    fn exists(&self, name: &str) -> Result<bool, AppError> {
        let status = self
            .cmd()
            .args(["has-session", "-t", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| AppError::new(ErrorCode::OperationFailed, err.to_string()))?;
        Ok(status.success())
    }
}

/// Background reader for a tmux pane: `tmux` owns the real pty and its
/// scrollback, so the only way to observe new output without a named pipe
/// is to re-capture the visible screen on an interval and diff it against
/// the previous capture. This yields rendered text, not a byte-exact replay
/// of the child's stdout, but it is enough to drive progress parsing and
/// live previews. Stops as soon as the session disappears.
async fn poll_pane_output(tmux_bin: String, name: String, tx: tokio::sync::mpsc::Sender<ReadChunk>) {
    let mut last_len = 0usize;
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(150));
    loop {
        ticker.tick().await;
        let capture = tokio::process::Command::new(&tmux_bin)
            .args(["capture-pane", "-p", "-e", "-t", &name])
            .output()
            .await;
        let stdout = match capture {
            Ok(output) if output.status.success() => output.stdout,
            _ => return,
        };
        if stdout.len() > last_len {
            let chunk = stdout[last_len..].to_vec();
            if tx.send(chunk).await.is_err() {
                return;
            }
        }
        last_len = stdout.len();

        let alive = tokio::process::Command::new(&tmux_bin)
            .args(["has-session", "-t", &name])
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);
        if !alive {
            return;
        }
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
