//! Rolling mean and population variance over a fixed window.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct RollingStats {
    window: usize,
    values: VecDeque<f64>,
    sum: f64,
}

/// Snapshot of the window after a value was added.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub mean: f64,
    pub variance: f64,
    /// False until the window has filled.
    pub valid: bool,
}

impl RollingStats {
    pub fn new(window: usize) -> Self {
        RollingStats {
            window: window.max(1),
            values: VecDeque::with_capacity(window.max(1)),
            sum: 0.0,
        }
    }

    pub fn add_value(&mut self, value: f64) -> StatsSnapshot {
        if self.values.len() == self.window {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;

        let n = self.values.len() as f64;
        let mean = self.sum / n;
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / n;

        StatsSnapshot {
            mean,
            variance,
            valid: self.values.len() == self.window,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
