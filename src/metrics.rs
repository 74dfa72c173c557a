//! Error statistics.
//!
//! Statistics are accumulated sample by sample (allocation-free) and merged across
//! workers. They do not participate in backprop.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Loss, TaskType};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Aggregate error of a model over a set of samples.
pub struct ErrorStat {
    pub task: TaskType,
    pub num_samples: usize,
    /// Number of scalar outputs seen (`num_samples * output_dim`).
    pub num_outputs: usize,
    pub sum_squared_error: f64,
    pub sum_loss: f64,
    /// Binary: correct (sample, output) pairs. Categorical: correct samples.
    pub num_hits: usize,
}

impl ErrorStat {
    pub fn new(task: TaskType) -> Self {
        Self {
            task,
            num_samples: 0,
            num_outputs: 0,
            sum_squared_error: 0.0,
            sum_loss: 0.0,
            num_hits: 0,
        }
    }

    /// Accumulate one sample.
    pub fn add_sample(&mut self, loss: Loss, computed: &[f64], ideal: &[f64]) {
        debug_assert_eq!(computed.len(), ideal.len());

        self.num_samples += 1;
        self.num_outputs += computed.len();
        for (&c, &i) in computed.iter().zip(ideal) {
            let diff = c - i;
            self.sum_squared_error = diff.mul_add(diff, self.sum_squared_error);
        }
        self.sum_loss += loss.compute(computed, ideal);

        match self.task {
            TaskType::Regression => {}
            TaskType::Binary => {
                self.num_hits += computed
                    .iter()
                    .zip(ideal)
                    .filter(|&(&c, &i)| (c >= 0.5) == (i >= 0.5))
                    .count();
            }
            TaskType::Categorical => {
                if argmax(computed) == argmax(ideal) {
                    self.num_hits += 1;
                }
            }
        }
    }

    /// Fold another statistic (from another worker) into this one.
    pub fn merge(&mut self, other: &ErrorStat) {
        debug_assert_eq!(self.task, other.task);

        self.num_samples += other.num_samples;
        self.num_outputs += other.num_outputs;
        self.sum_squared_error += other.sum_squared_error;
        self.sum_loss += other.sum_loss;
        self.num_hits += other.num_hits;
    }

    /// Mean squared error over all scalar outputs.
    pub fn mse(&self) -> f64 {
        if self.num_outputs == 0 {
            return 0.0;
        }
        self.sum_squared_error / self.num_outputs as f64
    }

    pub fn rmse(&self) -> f64 {
        self.mse().sqrt()
    }

    /// Mean per-sample loss.
    pub fn mean_loss(&self) -> f64 {
        if self.num_samples == 0 {
            return 0.0;
        }
        self.sum_loss / self.num_samples as f64
    }

    /// Classification accuracy in `[0, 1]`; `None` for regression.
    pub fn accuracy(&self) -> Option<f64> {
        let denom = match self.task {
            TaskType::Regression => return None,
            TaskType::Binary => self.num_outputs,
            TaskType::Categorical => self.num_samples,
        };
        if denom == 0 {
            return Some(0.0);
        }
        Some(self.num_hits as f64 / denom as f64)
    }

    /// True when every classification decision is correct.
    pub fn is_perfect(&self) -> bool {
        self.accuracy().is_some_and(|acc| acc >= 1.0)
    }
}

#[inline]
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_rmse() {
        let mut stat = ErrorStat::new(TaskType::Regression);
        stat.add_sample(Loss::SquaredError, &[1.0], &[0.0]);
        stat.add_sample(Loss::SquaredError, &[0.0], &[0.0]);
        assert!((stat.mse() - 0.5).abs() < 1e-12);
        assert!(stat.accuracy().is_none());
    }

    #[test]
    fn binary_accuracy_counts_outputs() {
        let mut stat = ErrorStat::new(TaskType::Binary);
        stat.add_sample(Loss::BinaryCrossEntropy, &[0.9, 0.2], &[1.0, 1.0]);
        assert_eq!(stat.accuracy(), Some(0.5));
        assert!(!stat.is_perfect());
    }

    #[test]
    fn merge_matches_single_accumulator() {
        let mut a = ErrorStat::new(TaskType::Categorical);
        let mut b = ErrorStat::new(TaskType::Categorical);
        let mut all = ErrorStat::new(TaskType::Categorical);

        let samples = [
            ([0.7, 0.3], [1.0, 0.0]),
            ([0.6, 0.4], [0.0, 1.0]),
            ([0.1, 0.9], [0.0, 1.0]),
        ];
        for (i, (c, t)) in samples.iter().enumerate() {
            let target = if i == 0 { &mut a } else { &mut b };
            target.add_sample(Loss::CategoricalCrossEntropy, c, t);
            all.add_sample(Loss::CategoricalCrossEntropy, c, t);
        }
        a.merge(&b);
        assert_eq!(a.num_hits, all.num_hits);
        assert!((a.sum_loss - all.sum_loss).abs() < 1e-12);
        assert!((a.accuracy().unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }
}
