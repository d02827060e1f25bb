// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress-tracker circuit breaker (§4.4). Three independent counter
//! families — no-progress, repeated-same-error, tests-failing-too-long —
//! each follow the same two-threshold pattern: two consecutive failures
//! warn (half-open), three open the breaker outright. Once open, a
//! family stays open until an explicit reset; a single success only
//! closes a half-open family, it never reopens an already-open one.

use serde::{Deserialize, Serialize};

use crate::parsers::status_block::StatusBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CounterFamily {
    NoProgress,
    RepeatedSameError,
    TestsFailingTooLong,
}

/// One state change in a counter family, suitable for `plan:circuitBreakerUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerTransition {
    pub family: String,
    pub reason: String,
    pub reason_code: String,
    pub from: BreakerState,
    pub to: BreakerState,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counter {
    state_is_open: bool,
    state_is_half_open: bool,
    streak: u32,
}

impl Counter {
    fn state(&self) -> BreakerState {
        if self.state_is_open {
            BreakerState::Open
        } else if self.state_is_half_open {
            BreakerState::HalfOpen
        } else {
            BreakerState::Closed
        }
    }

    fn set_state(&mut self, state: BreakerState) {
        self.state_is_open = state == BreakerState::Open;
        self.state_is_half_open = state == BreakerState::HalfOpen;
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn family_name(family: CounterFamily) -> &'static str {
    match family {
        CounterFamily::NoProgress => "no-progress",
        CounterFamily::RepeatedSameError => "repeated-same-error",
        CounterFamily::TestsFailingTooLong => "tests-failing-too-long",
    }
}

pub struct CircuitBreaker {
    no_progress: Counter,
    repeated_same_error: Counter,
    tests_failing_too_long: Counter,
    last_cycle_with_progress: Option<u64>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            no_progress: Counter::default(),
            repeated_same_error: Counter::default(),
            tests_failing_too_long: Counter::default(),
            last_cycle_with_progress: None,
        }
    }

    /// Drive the no-progress family from a parsed status block.
    pub fn observe_status_block(&mut self, block: &StatusBlock, cycle_index: u64) -> Option<BreakerTransition> {
        if block.made_progress() {
            self.last_cycle_with_progress = Some(cycle_index);
            self.record_success(CounterFamily::NoProgress)
        } else {
            self.record_failure(CounterFamily::NoProgress)
        }
    }

    /// Drive the repeated-same-error family.
    pub fn observe_repeated_error(&mut self, is_repeat: bool) -> Option<BreakerTransition> {
        if is_repeat {
            self.record_failure(CounterFamily::RepeatedSameError)
        } else {
            self.record_success(CounterFamily::RepeatedSameError)
        }
    }

    /// Drive the tests-failing-too-long family.
    pub fn observe_tests_failing(&mut self, still_failing: bool) -> Option<BreakerTransition> {
        if still_failing {
            self.record_failure(CounterFamily::TestsFailingTooLong)
        } else {
            self.record_success(CounterFamily::TestsFailingTooLong)
        }
    }

    fn counter_mut(&mut self, family: CounterFamily) -> &mut Counter {
        match family {
            CounterFamily::NoProgress => &mut self.no_progress,
            CounterFamily::RepeatedSameError => &mut self.repeated_same_error,
            CounterFamily::TestsFailingTooLong => &mut self.tests_failing_too_long,
        }
    }

    fn record_success(&mut self, family: CounterFamily) -> Option<BreakerTransition> {
        let counter = self.counter_mut(family);
        counter.streak = 0;
        if counter.state() != BreakerState::HalfOpen {
            return None;
        }
        let from = counter.state();
        counter.set_state(BreakerState::Closed);
        Some(BreakerTransition {
            family: family_name(family).to_owned(),
            reason: "progress detected".to_owned(),
            reason_code: format!("{}-closed", family_name(family)),
            from,
            to: BreakerState::Closed,
            timestamp_ms: now_ms(),
        })
    }

    fn record_failure(&mut self, family: CounterFamily) -> Option<BreakerTransition> {
        let counter = self.counter_mut(family);
        if counter.state() == BreakerState::Open {
            return None;
        }
        counter.streak += 1;
        let from = counter.state();
        let to = if counter.streak >= 3 {
            BreakerState::Open
        } else if counter.streak >= 2 {
            BreakerState::HalfOpen
        } else {
            BreakerState::Closed
        };
        if to == from {
            return None;
        }
        counter.set_state(to);
        let reason = match to {
            BreakerState::HalfOpen => format!("{} warning", family_name(family)),
            BreakerState::Open => format!("{} open", family_name(family)),
            BreakerState::Closed => unreachable!("a failure never transitions back to closed"),
        };
        Some(BreakerTransition {
            family: family_name(family).to_owned(),
            reason_code: format!("{}-{}", family_name(family), if to == BreakerState::Open { "open" } else { "warning" }),
            reason,
            from,
            to,
            timestamp_ms: now_ms(),
        })
    }

    /// Whether any family is open; the tracker must refuse to arm
    /// auto-cycling while this holds.
    pub fn is_open(&self) -> bool {
        [self.no_progress, self.repeated_same_error, self.tests_failing_too_long]
            .iter()
            .any(|c| c.state() == BreakerState::Open)
    }

    pub fn last_cycle_with_progress(&self) -> Option<u64> {
        self.last_cycle_with_progress
    }

    /// Explicit `reset-circuit-breaker`: clears every family back to closed.
    pub fn reset(&mut self) {
        self.no_progress = Counter::default();
        self.repeated_same_error = Counter::default();
        self.tests_failing_too_long = Counter::default();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "circuit_breaker_tests.rs"]
mod tests;
