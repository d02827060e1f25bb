// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/ws/events` — the aggregated event stream (§6). Every collaborator
//! connection receives the same `broadcast` feed; an optional `session`
//! query parameter narrows it to one session's events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::supervisor::Supervisor;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub session: Option<String>,
}

pub async fn ws_handler(
    State(supervisor): State<Arc<Supervisor>>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(supervisor, query.session, socket))
}

async fn handle_connection(supervisor: Arc<Supervisor>, session_filter: Option<String>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = supervisor.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                let envelope = match event {
                    Ok(envelope) => envelope,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !matches_filter(&envelope.session_id, &session_filter) {
                    continue;
                }
                let Ok(json) = serde_json::to_string(&envelope) else { continue };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

fn matches_filter(session_id: &Option<String>, filter: &Option<String>) -> bool {
    match filter {
        None => true,
        Some(wanted) => session_id.as_deref() == Some(wanted.as_str()),
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
