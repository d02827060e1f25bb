// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the supervisor's external surface (§6). Every
//! response is wrapped in the standard result envelope: `{ok: true, data}`
//! on success, `{ok: false, code, message}` on a typed [`AppError`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::multiplexer::CpuPriority;
use crate::session::{PermissionPolicy, SessionConfig, SessionMode};
use crate::supervisor::{CreateSessionRequest, Supervisor};

/// Standard result envelope (§7): success carries `data`, failure carries
/// the error's typed code and message.
pub enum Envelope<T> {
    Ok(T),
    Err(AppError),
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        match self {
            Envelope::Ok(data) => Json(OkBody { ok: true, data }).into_response(),
            Envelope::Err(err) => {
                let status = axum::http::StatusCode::from_u16(err.code.http_status())
                    .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(ErrBody { ok: false, code: err.code.as_str(), message: err.message })).into_response()
            }
        }
    }
}

impl<T> From<Result<T, AppError>> for Envelope<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => Envelope::Ok(data),
            Err(err) => Envelope::Err(err),
        }
    }
}

#[derive(Serialize)]
struct OkBody<T> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct ErrBody {
    ok: bool,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: &'static str,
    pub session_count: usize,
}

pub async fn health(State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    let session_count = supervisor.session_count().await;
    Envelope::Ok(HealthBody { status: "running", session_count })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    pub name: Option<String>,
    pub color_tag: Option<String>,
    pub working_dir: PathBuf,
    #[serde(default = "default_mode")]
    pub mode: SessionMode,
    #[serde(default = "default_assistant_variant")]
    pub assistant_variant: String,
    pub model: Option<String>,
    #[serde(default)]
    pub permission_policy: PermissionPolicy,
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub completion_phrase: Option<String>,
}

fn default_mode() -> SessionMode {
    SessionMode::Interactive
}

fn default_assistant_variant() -> String {
    "claude".to_owned()
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub id: String,
}

pub async fn create_session(
    State(supervisor): State<Arc<Supervisor>>,
    Json(body): Json<CreateSessionBody>,
) -> impl IntoResponse {
    let request = CreateSessionRequest {
        config: SessionConfig {
            name: body.name,
            color_tag: body.color_tag,
            working_dir: body.working_dir,
            mode: body.mode,
            assistant_variant: body.assistant_variant,
            model: body.model,
            permission_policy: body.permission_policy,
            cpu_priority: CpuPriority::Normal,
        },
        command: body.command,
        env: body.env.into_iter().collect(),
        completion_phrase: body.completion_phrase,
        respawn: None,
    };
    let result = supervisor.create_session(request).await.map(|id| CreateSessionResponse { id });
    Envelope::from(result)
}

pub async fn list_sessions(State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    Envelope::Ok::<Vec<String>>(supervisor.list_sessions().await)
}

pub async fn session_snapshot(State(supervisor): State<Arc<Supervisor>>, Path(id): Path<String>) -> impl IntoResponse {
    Envelope::from(supervisor.snapshot(&id).await)
}

pub async fn terminate_session(State(supervisor): State<Arc<Supervisor>>, Path(id): Path<String>) -> impl IntoResponse {
    Envelope::from(supervisor.terminate_session(&id).await.map(|()| EmptyBody {}))
}

pub async fn stop_session(State(supervisor): State<Arc<Supervisor>>, Path(id): Path<String>) -> impl IntoResponse {
    Envelope::from(supervisor.stop_session(&id).await.map(|()| EmptyBody {}))
}

#[derive(Deserialize)]
pub struct WriteInputBody {
    pub text: String,
}

pub async fn write_input(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<String>,
    Json(body): Json<WriteInputBody>,
) -> impl IntoResponse {
    Envelope::from(supervisor.write_input(&id, body.text.as_bytes()).await.map(|()| EmptyBody {}))
}

#[derive(Deserialize)]
pub struct ResizeBody {
    pub cols: u16,
    pub rows: u16,
}

pub async fn resize_session(
    State(supervisor): State<Arc<Supervisor>>,
    Path(id): Path<String>,
    Json(body): Json<ResizeBody>,
) -> impl IntoResponse {
    Envelope::from(supervisor.resize(&id, body.cols, body.rows).await.map(|()| EmptyBody {}))
}

#[derive(Serialize)]
pub struct EmptyBody {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduledRunBody {
    pub prompt: String,
    pub working_dir: PathBuf,
    pub duration_minutes: f64,
}

#[derive(Serialize)]
pub struct CreateScheduledRunResponse {
    pub id: String,
}

pub async fn create_scheduled_run(
    State(supervisor): State<Arc<Supervisor>>,
    Json(body): Json<CreateScheduledRunBody>,
) -> impl IntoResponse {
    let duration = std::time::Duration::from_secs_f64((body.duration_minutes * 60.0).max(0.0));
    let id = supervisor.start_scheduled_run(body.prompt, body.working_dir, duration).await;
    Envelope::Ok(CreateScheduledRunResponse { id })
}

pub async fn list_scheduled_runs(State(supervisor): State<Arc<Supervisor>>) -> impl IntoResponse {
    Envelope::Ok::<Vec<String>>(supervisor.list_scheduled_runs().await)
}

pub async fn scheduled_run_snapshot(State(supervisor): State<Arc<Supervisor>>, Path(id): Path<String>) -> impl IntoResponse {
    Envelope::from(supervisor.scheduled_run_snapshot(&id).await)
}

pub async fn stop_scheduled_run(State(supervisor): State<Arc<Supervisor>>, Path(id): Path<String>) -> impl IntoResponse {
    Envelope::from(supervisor.stop_scheduled_run(&id).await.map(|()| EmptyBody {}))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
