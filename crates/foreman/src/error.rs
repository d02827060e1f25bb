// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes surfaced to external collaborators through the
/// result envelope (see [`crate::transport::Envelope`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A caller-supplied value violates a contract (bad colour tag, unknown id shape).
    InvalidInput,
    /// A named entity does not exist (session, plan version, scheduled run).
    NotFound,
    /// Unique-name collision.
    AlreadyExists,
    /// An exclusive operation was attempted while another is in flight.
    SessionBusy,
    /// A call into an external collaborator failed (multiplexer, subprocess, disk, JSON).
    OperationFailed,
    /// The concurrent-session cap has been reached.
    ResourceExhausted,
    /// The progress tracker's circuit breaker is open; auto-cycling refuses to arm.
    CircuitOpen,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::SessionBusy => 409,
            Self::OperationFailed => 502,
            Self::ResourceExhausted => 429,
            Self::CircuitOpen => 423,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::SessionBusy => "SESSION_BUSY",
            Self::OperationFailed => "OPERATION_FAILED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::CircuitOpen => "CIRCUIT_OPEN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure returned by supervisor and multiplexer-adapter operations.
///
/// Parsers never produce this type — malformed input is swallowed silently
/// per the propagation policy; only operations that cross a real boundary
/// (disk, subprocess, external collaborator) surface it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceExhausted, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
