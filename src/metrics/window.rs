//! Bounded sliding windows.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed-capacity FIFO of delivery outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeWindow {
    samples: VecDeque<bool>,
    capacity: usize,
    successes: usize,
}

impl OutcomeWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            successes: 0,
        }
    }

    /// Push an outcome, evicting the oldest when full.
    pub fn push(&mut self, success: bool) {
        if self.samples.len() >= self.capacity {
            if let Some(true) = self.samples.pop_front() {
                self.successes -= 1;
            }
        }
        self.samples.push_back(success);
        if success {
            self.successes += 1;
        }
    }

    /// Delivery ratio over the window, `None` before the first sample.
    pub fn ratio(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.successes as f64 / self.samples.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn successes(&self) -> usize {
        self.successes
    }
}

/// Fixed-capacity FIFO of delay samples used for jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl DelayWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, delay_ms: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(delay_ms);
    }

    /// Mean absolute difference between consecutive samples (RFC 3550 style).
    pub fn jitter(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(a, b)| (b - a).abs())
            .sum();
        sum / (self.samples.len() - 1) as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }
}

/// Time-bounded FIFO of delivered bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputWindow {
    entries: VecDeque<(Duration, u32)>,
    span: Duration,
    bytes: u64,
}

impl ThroughputWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            span,
            bytes: 0,
        }
    }

    /// Record delivered bytes and evict entries older than the span.
    ///
    /// Returns the rate over the covered interval in Mbps, or `None` while
    /// the window covers zero elapsed time.
    pub fn record(&mut self, now: Duration, bytes: u32) -> Option<f64> {
        self.entries.push_back((now, bytes));
        self.bytes += u64::from(bytes);

        while let Some(&(at, b)) = self.entries.front() {
            if now.saturating_sub(at) > self.span {
                self.entries.pop_front();
                self.bytes -= u64::from(b);
            } else {
                break;
            }
        }

        self.rate_mbps(now)
    }

    fn rate_mbps(&self, now: Duration) -> Option<f64> {
        let (oldest, _) = self.entries.front()?;
        let covered = now.saturating_sub(*oldest).as_secs_f64();
        if covered > 0.0 {
            Some(self.bytes as f64 * 8.0 / (covered * 1e6))
        } else {
            None
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
