//! Fitness components and the optional annualized-return bonus policy.

use super::investment::Investment;

const DAYS_PER_YEAR: f64 = 365.25;

/// `(end/start)^(1/years) - 1`, years measured as `days / 365.25`.
pub fn annualized_return(start_value: f64, end_value: f64, days: i64) -> f64 {
    if start_value <= 0.0 || end_value <= 0.0 || days <= 0 {
        return 0.0;
    }
    let years = days as f64 / DAYS_PER_YEAR;
    (end_value / start_value).powf(1.0 / years) - 1.0
}

/// Share of profitable chunks across completed lots. 0 when nothing settled.
pub fn correctness(investments: &[Investment]) -> f64 {
    let (correct, total) = investments
        .iter()
        .filter(|inv| inv.completed && !inv.bookkeeping)
        .flat_map(|inv| inv.chunks.iter())
        .fold((0usize, 0usize), |(c, t), chunk| {
            (c + usize::from(chunk.profitable), t + 1)
        });
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Scales a non-negative fitness score by an annualized-return keyed multiplier.
pub trait FitnessBonus: Send + Sync {
    fn multiplier(&self, annualized_return: f64) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBonus;

impl FitnessBonus for NoBonus {
    fn multiplier(&self, _annualized_return: f64) -> f64 {
        1.0
    }
}

/// Piecewise step multipliers. The highest threshold met applies.
#[derive(Debug, Clone, PartialEq)]
pub struct StepBonus {
    steps: Vec<(f64, f64)>,
}

impl StepBonus {
    pub fn new(mut steps: Vec<(f64, f64)>) -> Self {
        steps.sort_by(|a, b| a.0.total_cmp(&b.0));
        StepBonus { steps }
    }
}

impl Default for StepBonus {
    fn default() -> Self {
        StepBonus::new(vec![(0.10, 1.5), (0.20, 2.0), (0.50, 3.0)])
    }
}

impl FitnessBonus for StepBonus {
    fn multiplier(&self, annualized_return: f64) -> f64 {
        self.steps
            .iter()
            .rev()
            .find(|(threshold, _)| annualized_return >= *threshold)
            .map(|(_, m)| *m)
            .unwrap_or(1.0)
    }
}
