// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON message parser (§4.3).

use serde::{Deserialize, Serialize};

/// One parsed message from the assistant subprocess's structured-output
/// stream. Ordered by arrival; immutable once appended to a session's
/// message buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParsedMessage {
    System { #[serde(flatten)] payload: serde_json::Value },
    Assistant { #[serde(flatten)] payload: serde_json::Value },
    User { #[serde(flatten)] payload: serde_json::Value },
    Result { cost: Option<f64>, message: Option<ResultMessage> },
}

/// The nested `message.usage` object carried by a `result` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ParsedMessage {
    pub fn discriminator(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::Assistant { .. } => "assistant",
            Self::User { .. } => "user",
            Self::Result { .. } => "result",
        }
    }
}

/// Stateless: a line either parses as one discriminated JSON object or it
/// doesn't. Malformed lines are silently skipped, never surfaced as errors.
pub struct StructuredMessageParser;

impl StructuredMessageParser {
    pub fn parse_line(&mut self, line: &str) -> Option<ParsedMessage> {
        let trimmed = line.trim();
        if trimmed.is_empty() || !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str::<ParsedMessage>(trimmed).ok()
    }
}

#[cfg(test)]
#[path = "structured_message_tests.rs"]
mod tests;
