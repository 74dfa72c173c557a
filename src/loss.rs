//! Loss functions.
//!
//! A loss scores the divergence of a computed output vector from the ideal one and
//! provides the output-layer gradient w.r.t. the weighted sums (`dL/dz`), which is where
//! backprop starts.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Activation, TaskType};

/// Probabilities are clamped into `[P_EPS, 1 - P_EPS]` before taking logs.
const P_EPS: f64 = 1e-15;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Supported loss functions.
pub enum Loss {
    /// Mean squared difference over the outputs.
    SquaredError,
    /// Mean binary cross-entropy over independent sigmoid outputs.
    BinaryCrossEntropy,
    /// Categorical cross-entropy over a softmax output.
    CategoricalCrossEntropy,
}

impl Loss {
    /// Output activation and loss implied by a task type.
    pub fn for_task(task: TaskType) -> (Activation, Loss) {
        match task {
            TaskType::Binary => (Activation::Sigmoid, Loss::BinaryCrossEntropy),
            TaskType::Categorical => (Activation::Softmax, Loss::CategoricalCrossEntropy),
            TaskType::Regression => (Activation::Linear, Loss::SquaredError),
        }
    }

    /// Loss value of one sample.
    ///
    /// Shape contract: `computed.len() == ideal.len()`.
    #[inline]
    pub fn compute(self, computed: &[f64], ideal: &[f64]) -> f64 {
        assert_eq!(
            computed.len(),
            ideal.len(),
            "computed len {} does not match ideal len {}",
            computed.len(),
            ideal.len()
        );
        if computed.is_empty() {
            return 0.0;
        }

        match self {
            Loss::SquaredError => {
                let mut sum_sq = 0.0;
                for (&c, &i) in computed.iter().zip(ideal) {
                    let diff = c - i;
                    sum_sq = diff.mul_add(diff, sum_sq);
                }
                sum_sq / computed.len() as f64
            }
            Loss::BinaryCrossEntropy => {
                let mut sum = 0.0;
                for (&c, &t) in computed.iter().zip(ideal) {
                    let p = c.clamp(P_EPS, 1.0 - P_EPS);
                    sum -= t * p.ln() + (1.0 - t) * (1.0 - p).ln();
                }
                sum / computed.len() as f64
            }
            Loss::CategoricalCrossEntropy => {
                let mut sum = 0.0;
                for (&c, &t) in computed.iter().zip(ideal) {
                    if t != 0.0 {
                        sum -= t * c.clamp(P_EPS, 1.0).ln();
                    }
                }
                sum
            }
        }
    }

    /// Writes `dL/dz` for every output neuron into `grad_out`.
    ///
    /// Cross-entropy losses assume their matching output activation (Sigmoid / Softmax),
    /// for which the gradient collapses to `computed - ideal`. Losses averaged over the
    /// outputs divide their gradient by the output count as well.
    ///
    /// Shape contract: all slices have the same length.
    #[inline]
    pub fn compute_z_gradient(
        self,
        activation: Activation,
        computed: &[f64],
        ideal: &[f64],
        sums: &[f64],
        grad_out: &mut [f64],
    ) {
        assert_eq!(computed.len(), ideal.len());
        assert_eq!(computed.len(), sums.len());
        assert_eq!(computed.len(), grad_out.len());

        let inv_outputs = 1.0 / computed.len().max(1) as f64;
        match self {
            Loss::CategoricalCrossEntropy => {
                for ((g, &c), &i) in grad_out.iter_mut().zip(computed).zip(ideal) {
                    *g = c - i;
                }
            }
            Loss::BinaryCrossEntropy => {
                for ((g, &c), &i) in grad_out.iter_mut().zip(computed).zip(ideal) {
                    *g = (c - i) * inv_outputs;
                }
            }
            Loss::SquaredError => {
                for (idx, g) in grad_out.iter_mut().enumerate() {
                    let c = computed[idx];
                    *g = 2.0 * (c - ideal[idx]) * activation.derivative(sums[idx], c) * inv_outputs;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_error_is_zero_when_equal() {
        let v = [1.0, -2.0, 0.5];
        assert_eq!(Loss::SquaredError.compute(&v, &v), 0.0);
    }

    #[test]
    fn squared_error_is_mean_over_outputs() {
        let loss = Loss::SquaredError.compute(&[1.0, 3.0], &[2.0, 1.0]);
        assert!((loss - 2.5).abs() < 1e-12);
    }

    #[test]
    fn binary_cross_entropy_is_finite_for_saturated_outputs() {
        let loss = Loss::BinaryCrossEntropy.compute(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(loss.is_finite());
        assert!(loss > 30.0);

        let half = Loss::BinaryCrossEntropy.compute(&[0.5], &[1.0]);
        assert!((half - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn categorical_cross_entropy_prefers_correct_class() {
        let ideal = [1.0, 0.0, 0.0];
        let good = Loss::CategoricalCrossEntropy.compute(&[0.8, 0.1, 0.1], &ideal);
        let bad = Loss::CategoricalCrossEntropy.compute(&[0.1, 0.1, 0.8], &ideal);
        assert!(good < bad);
    }

    #[test]
    fn z_gradient_of_squared_error_uses_activation_derivative() {
        let sums = [0.3];
        let computed = [Activation::TanH.compute(0.3)];
        let mut g = [0.0];
        Loss::SquaredError.compute_z_gradient(Activation::TanH, &computed, &[1.0], &sums, &mut g);
        let expected = 2.0 * (computed[0] - 1.0) * (1.0 - computed[0] * computed[0]);
        assert!((g[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn z_gradients_match_loss_derivative() {
        let eps = 1e-6;
        let ideal = [1.0, 0.0, 0.25];
        let sums = [0.4, -1.1, 0.2];
        for (loss, act) in [
            (Loss::SquaredError, Activation::TanH),
            (Loss::BinaryCrossEntropy, Activation::Sigmoid),
        ] {
            let eval = |z: &[f64]| {
                let mut out = [0.0; 3];
                act.compute_vec(z, &mut out);
                loss.compute(&out, &ideal)
            };
            let mut computed = [0.0; 3];
            act.compute_vec(&sums, &mut computed);
            let mut g = [0.0; 3];
            loss.compute_z_gradient(act, &computed, &ideal, &sums, &mut g);
            for k in 0..3 {
                let mut plus = sums;
                let mut minus = sums;
                plus[k] += eps;
                minus[k] -= eps;
                let numeric = (eval(&plus) - eval(&minus)) / (2.0 * eps);
                assert!(
                    (numeric - g[k]).abs() < 1e-7,
                    "{loss:?} output {k}: numeric {numeric} analytic {}",
                    g[k]
                );
            }
        }
    }

    #[test]
    fn z_gradient_of_cross_entropy_is_difference() {
        let mut g = [0.0; 2];
        Loss::CategoricalCrossEntropy.compute_z_gradient(
            Activation::Softmax,
            &[0.7, 0.3],
            &[1.0, 0.0],
            &[0.0, 0.0],
            &mut g,
        );
        assert!((g[0] + 0.3).abs() < 1e-12);
        assert!((g[1] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn task_selects_output_activation() {
        assert_eq!(
            Loss::for_task(TaskType::Binary),
            (Activation::Sigmoid, Loss::BinaryCrossEntropy)
        );
        assert_eq!(
            Loss::for_task(TaskType::Regression),
            (Activation::Linear, Loss::SquaredError)
        );
    }
}
