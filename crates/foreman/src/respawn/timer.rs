// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adaptive completion-confirm timer (§4.5, §9). Tracks the observed
//! idle-detection latency of the last twenty cycles and uses their 75th
//! percentile plus a safety buffer once enough samples have accumulated;
//! before that, an initial configured value is used. Always clamped to
//! `[min, max]`.

use std::collections::VecDeque;
use std::time::Duration;

const SAMPLE_WINDOW: usize = 20;

pub struct ConfirmTimer {
    samples: VecDeque<Duration>,
    min: Duration,
    max: Duration,
    initial: Duration,
    min_sample_count: usize,
    buffer: f64,
}

impl ConfirmTimer {
    pub fn new(initial: Duration, min: Duration, max: Duration, min_sample_count: usize, buffer: f64) -> Self {
        Self { samples: VecDeque::new(), min, max, initial: initial.clamp(min, max), min_sample_count, buffer }
    }

    /// Record the observed idle-detection latency of a completed cycle.
    pub fn record_observed_latency(&mut self, latency: Duration) {
        self.samples.push_back(latency);
        while self.samples.len() > SAMPLE_WINDOW {
            self.samples.pop_front();
        }
    }

    /// The current confirm timer duration, clamped to configured bounds.
    pub fn current(&self) -> Duration {
        if self.samples.len() < self.min_sample_count {
            return self.initial;
        }
        let p75 = percentile(&self.samples, 0.75);
        let buffered = p75.mul_f64(1.0 + self.buffer);
        buffered.clamp(self.min, self.max)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

fn percentile(samples: &VecDeque<Duration>, fraction: f64) -> Duration {
    let mut sorted: Vec<Duration> = samples.iter().copied().collect();
    sorted.sort();
    let index = ((sorted.len() - 1) as f64 * fraction).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
