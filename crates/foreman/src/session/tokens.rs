// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token accounting (§4.2). One-shot mode reads exact counts from the
//! structured `result` message; interactive mode has only a status-line
//! total and splits it heuristically (§9 open questions: ratio kept
//! configurable rather than hard-coded 60/40).

use std::sync::OnceLock;

use regex::Regex;

/// Matches a status-line token count: a numeric value, an optional `k`/`M`
/// magnitude suffix, and the literal word "tokens" (singular tolerated).
fn token_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([\d.]+)\s*(k|m)?\s*tokens?\b").expect("static regex is valid")
    })
}

/// Parse the most recent token-count mention in a status line, returning
/// the resolved total (magnitude suffix expanded).
pub fn parse_status_line_tokens(line: &str) -> Option<u64> {
    let caps = token_count_re().captures_iter(line).last()?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(ref suffix) if suffix == "k" => 1_000.0,
        Some(ref suffix) if suffix == "m" => 1_000_000.0,
        _ => 1.0,
    };
    Some((value * multiplier).round() as u64)
}

pub struct TokenCounter {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    input_ratio: f64,
    auto_clear_threshold: u64,
}

impl TokenCounter {
    pub fn new(input_ratio: f64, auto_clear_threshold: u64) -> Self {
        Self { input_tokens: 0, output_tokens: 0, cost: 0.0, input_ratio, auto_clear_threshold }
    }

    /// Record exact counts from a one-shot `result` message.
    pub fn record_exact(&mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost = cost;
    }

    /// Record an interactive-mode status-line total, splitting it by the
    /// configured ratio.
    pub fn record_status_line_total(&mut self, total: u64) {
        let input = (total as f64 * self.input_ratio).round() as u64;
        self.input_tokens = input;
        self.output_tokens = total.saturating_sub(input);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Whether the accumulated total has crossed the auto-clear threshold.
    pub fn exceeds_auto_clear_threshold(&self) -> bool {
        self.total() >= self.auto_clear_threshold
    }

    /// Reset counters (and cost) after an auto-clear cycle.
    pub fn reset(&mut self) {
        self.input_tokens = 0;
        self.output_tokens = 0;
        self.cost = 0.0;
    }
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
