// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State store (§4.7): a debounced `state.json` plus a rapidly-changing
//! `inner-state.json`. Writes coalesce within a configurable window; a
//! caller may force an immediate flush. Loading merges parsed contents
//! with defaults so a schema addition never erases an older record.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::progress::plan::TodoItem;
use crate::session::SessionConfig;

/// Per-session knobs that the supervisor persists alongside the session's
/// own config. Kept as plain fields rather than the runtime
/// [`crate::respawn::RespawnConfig`] (whose `Duration` fields are not
/// serializable) so reconciliation on restart has something to rebuild it
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRespawnConfig {
    pub update_prompt: String,
    pub clear_directive: String,
    pub init_directive: String,
    pub kickstart_prompt: String,
    pub send_clear: bool,
    pub send_init: bool,
    pub auto_accept: bool,
    pub inter_step_delay_ms: u64,
    pub auto_accept_confirm_delay_ms: u64,
    pub confirm_initial_secs: u64,
    pub confirm_min_secs: u64,
    pub confirm_max_secs: u64,
    pub confirm_min_samples: usize,
    pub confirm_buffer: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub config: SessionConfig,
    pub pane_name: String,
    pub respawn: PersistedRespawnConfig,
    pub todos: Vec<TodoItem>,
    pub created_at_ms: u64,
}

/// One day's worth of token usage, bucketed by UTC calendar day (epoch days).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyTokens {
    pub day: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Slow-changing aggregate, written to `state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateState {
    pub sessions: HashMap<String, SessionRecord>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub sessions_ever_created: u64,
    pub daily_tokens: VecDeque<DailyTokens>,
}

/// Fast-changing per-session status, written to `inner-state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InnerState {
    pub session_states: HashMap<String, String>,
}

const DAILY_TOKENS_CAP: usize = 90;

fn atomic_write(path: &Path, contents: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
    Ok(())
}

fn load_merged<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    std::fs::read_to_string(path).ok().and_then(|contents| serde_json::from_str(&contents).ok()).unwrap_or_default()
}

/// Debounced JSON persistence for session metadata and aggregate counters.
///
/// Every mutator stamps a monotonically increasing generation and schedules
/// a delayed flush; if another mutation lands before the delay elapses, the
/// stale flush sees a newer generation and skips itself, so rapid bursts of
/// writes coalesce into one disk write.
pub struct StateStore {
    state_path: PathBuf,
    inner_path: PathBuf,
    state: Mutex<AggregateState>,
    inner: Mutex<InnerState>,
    debounce: Duration,
    state_generation: AtomicU64,
    inner_generation: AtomicU64,
    weak_self: Weak<StateStore>,
}

impl StateStore {
    pub fn load(dir: &Path, debounce: Duration) -> Arc<Self> {
        let state_path = dir.join("state.json");
        let inner_path = dir.join("inner-state.json");
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(load_merged(&state_path)),
            inner: Mutex::new(load_merged(&inner_path)),
            state_path,
            inner_path,
            debounce,
            state_generation: AtomicU64::new(0),
            inner_generation: AtomicU64::new(0),
            weak_self: weak_self.clone(),
        })
    }

    pub async fn snapshot(&self) -> AggregateState {
        self.state.lock().await.clone()
    }

    pub async fn upsert_session(&self, record: SessionRecord) {
        {
            let mut state = self.state.lock().await;
            if !state.sessions.contains_key(&record.id) {
                state.sessions_ever_created += 1;
            }
            state.sessions.insert(record.id.clone(), record);
        }
        self.schedule_state_flush();
    }

    pub async fn remove_session(&self, id: &str) {
        {
            let mut state = self.state.lock().await;
            state.sessions.remove(id);
        }
        {
            let mut inner = self.inner.lock().await;
            inner.session_states.remove(id);
        }
        self.schedule_state_flush();
        self.schedule_inner_flush();
    }

    pub async fn record_usage(&self, day: u64, input_tokens: u64, output_tokens: u64, cost: f64) {
        {
            let mut state = self.state.lock().await;
            state.total_input_tokens += input_tokens;
            state.total_output_tokens += output_tokens;
            state.total_cost += cost;
            match state.daily_tokens.back_mut().filter(|bucket| bucket.day == day) {
                Some(bucket) => {
                    bucket.input_tokens += input_tokens;
                    bucket.output_tokens += output_tokens;
                }
                None => {
                    state.daily_tokens.push_back(DailyTokens { day, input_tokens, output_tokens });
                    while state.daily_tokens.len() > DAILY_TOKENS_CAP {
                        state.daily_tokens.pop_front();
                    }
                }
            }
        }
        self.schedule_state_flush();
    }

    pub async fn set_session_state(&self, id: &str, state: impl Into<String>) {
        {
            let mut inner = self.inner.lock().await;
            inner.session_states.insert(id.to_owned(), state.into());
        }
        self.schedule_inner_flush();
    }

    /// Flush both files immediately, bypassing the debounce window.
    pub async fn force_flush(&self) -> Result<(), AppError> {
        self.flush_state().await?;
        self.flush_inner().await
    }

    /// Clear all in-memory state and force-flush both files.
    pub async fn reset(&self) -> Result<(), AppError> {
        *self.state.lock().await = AggregateState::default();
        *self.inner.lock().await = InnerState::default();
        self.force_flush().await
    }

    async fn flush_state(&self) -> Result<(), AppError> {
        let state = self.state.lock().await;
        let contents = serde_json::to_string_pretty(&*state)
            .map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
        atomic_write(&self.state_path, &contents)
    }

    async fn flush_inner(&self) -> Result<(), AppError> {
        let inner = self.inner.lock().await;
        let contents = serde_json::to_string_pretty(&*inner)
            .map_err(|err| AppError::new(crate::error::ErrorCode::OperationFailed, err.to_string()))?;
        atomic_write(&self.inner_path, &contents)
    }

    /// Clones a strong reference from `weak_self` so the delayed flush can
    /// outlive this call. If every `Arc<StateStore>` has already been
    /// dropped there is nothing left to flush for, so the upgrade simply
    /// fails silently.
    fn schedule_state_flush(&self) {
        let generation = self.state_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(this) = self.weak_self.upgrade() else { return };
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            if this.state_generation.load(Ordering::SeqCst) == generation {
                if let Err(err) = this.flush_state().await {
                    tracing::error!(error = %err, "failed to flush state.json");
                }
            }
        });
    }

    fn schedule_inner_flush(&self) {
        let generation = self.inner_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(this) = self.weak_self.upgrade() else { return };
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            if this.inner_generation.load(Ordering::SeqCst) == generation {
                if let Err(err) = this.flush_inner().await {
                    tracing::error!(error = %err, "failed to flush inner-state.json");
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
