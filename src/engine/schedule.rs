//! Per-iteration Monte-Carlo sample budgets

use serde::{Deserialize, Serialize};

/// Affine growth schedule for the E-step sample count:
/// `base + increment * iteration`.
///
/// More samples as the estimate stabilizes. The affine form is kept as a
/// tunable pair rather than derived from a variance argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSchedule {
    /// Samples at iteration zero
    pub base: usize,
    /// Additional samples per iteration
    pub increment: usize,
}

impl Default for SampleSchedule {
    fn default() -> Self {
        Self {
            base: 500,
            increment: 100,
        }
    }
}

impl SampleSchedule {
    /// A constant-per-iteration schedule
    pub fn flat(base: usize) -> Self {
        Self { base, increment: 0 }
    }

    /// Sample count for a zero-based iteration index
    pub fn target(&self, iteration: usize) -> usize {
        self.base + self.increment * iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_growth() {
        let schedule = SampleSchedule {
            base: 200,
            increment: 50,
        };
        assert_eq!(schedule.target(0), 200);
        assert_eq!(schedule.target(1), 250);
        assert_eq!(schedule.target(10), 700);
    }

    #[test]
    fn test_flat_schedule() {
        let schedule = SampleSchedule::flat(300);
        assert_eq!(schedule.target(0), 300);
        assert_eq!(schedule.target(25), 300);
    }
}
