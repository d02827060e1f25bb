// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport (§6): the external collaborator surface.
//! Owns no state of its own — every handler is a thin translation between
//! axum request/response types and [`crate::supervisor::Supervisor`] calls.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::supervisor::Supervisor;

/// Build the axum `Router` exposing every session, scheduled-run, and
/// event-stream endpoint over the shared [`Supervisor`].
pub fn build_router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/sessions", post(http::create_session).get(http::list_sessions))
        .route("/api/v1/sessions/{id}", get(http::session_snapshot).delete(http::terminate_session))
        .route("/api/v1/sessions/{id}/stop", post(http::stop_session))
        .route("/api/v1/sessions/{id}/input", post(http::write_input))
        .route("/api/v1/sessions/{id}/resize", post(http::resize_session))
        .route("/api/v1/scheduled-runs", post(http::create_scheduled_run).get(http::list_scheduled_runs))
        .route("/api/v1/scheduled-runs/{id}", get(http::scheduled_run_snapshot))
        .route("/api/v1/scheduled-runs/{id}/stop", post(http::stop_scheduled_run))
        .route("/ws/events", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(supervisor)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
