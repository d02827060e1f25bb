// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexer adapter (§4.1): the pluggable backend that owns persistent,
//! named terminal panes. A session never talks to a subprocess directly —
//! it goes through this trait so that reattachment across supervisor
//! restarts is a property of the backend, not of the session.

pub mod native;
pub mod tmux;

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::AppError;

/// CPU scheduling priority hint passed through to the spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CpuPriority {
    Normal,
    Low,
}

/// A stream of raw terminal bytes. Adapters hand these back in fixed-size
/// chunks as they become available; the session owns ANSI-stripping and
/// buffering on top.
pub type ReadChunk = Vec<u8>;

/// Capability contract a backend must provide (§4.1). All operations are
/// non-blocking with bounded time and return a typed error on failure —
/// never panic, never block indefinitely.
pub trait MultiplexerAdapter: Send + Sync {
    /// Create a named pane running `command` with the given environment and
    /// working directory. Fails if the name already exists.
    fn create_session(
        &self,
        name: &str,
        working_dir: &std::path::Path,
        command: &[String],
        env: &[(String, String)],
        cpu_priority: CpuPriority,
    ) -> Result<(), AppError>;

    /// Attach a reader to `name`'s output. Returns a receiver of raw byte
    /// chunks as they arrive; closes when the pane exits or is killed.
    fn attach_read_stream(&self, name: &str) -> Result<tokio::sync::mpsc::Receiver<ReadChunk>, AppError>;

    /// Write bytes to the pane byte-for-byte, with no shell interpretation.
    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), AppError>;

    fn resize(&self, name: &str, cols: u16, rows: u16) -> Result<(), AppError>;

    fn kill(&self, name: &str) -> Result<(), AppError>;

    fn list(&self) -> Result<HashSet<String>, AppError>;

    fn exists(&self, name: &str) -> Result<bool, AppError>;
}

/// Side-file mapping session-id → pane name, so reattachment survives a
/// supervisor restart (§4.1, §4.6 startup reconciliation).
pub struct PaneRegistry {
    path: PathBuf,
}

impl PaneRegistry {
    pub fn new(state_dir: &std::path::Path) -> Self {
        Self { path: state_dir.join("panes.json") }
    }

    pub fn load(&self) -> std::collections::HashMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, mapping: &std::collections::HashMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(mapping)
            .map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
        Ok(())
    }
}
