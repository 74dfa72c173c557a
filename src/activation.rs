//! Activation functions.
//!
//! A layer computes a weighted sum `z = W x + b` per neuron and then applies an
//! activation: `a = f(z)`. Both `z` (sums) and `a` (activations) are kept in the flat
//! node buffers, so derivatives are expressed in terms of the sum.
//!
//! The same enum drives the reservoir's hidden neurons.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Activation function of a layer (or reservoir neuron).
pub enum Activation {
    Sigmoid,
    /// Vector activation. Output layers only.
    Softmax,
    TanH,
    ReLU,
    LeakyReLU {
        alpha: f64,
    },
    ELU {
        alpha: f64,
    },
    SoftPlus,
    Linear,
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Activation::LeakyReLU { alpha } | Activation::ELU { alpha } => {
                if !(alpha.is_finite() && alpha >= 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "{self:?} alpha must be finite and >= 0, got {alpha}"
                    )));
                }
            }
            Activation::Sigmoid
            | Activation::Softmax
            | Activation::TanH
            | Activation::ReLU
            | Activation::SoftPlus
            | Activation::Linear => {}
        }

        Ok(())
    }

    /// True for activations that work element-wise (everything except Softmax).
    #[inline]
    pub fn is_elementwise(self) -> bool {
        !matches!(self, Activation::Softmax)
    }

    /// Whether dropout may be applied to the outputs of a layer using this activation.
    #[inline]
    pub fn supports_dropout(self) -> bool {
        self.is_elementwise()
    }

    /// Standard deviation of the normal distribution used for weight initialization.
    ///
    /// - ReLU family / ELU: He (`sqrt(2 / fan_in)`)
    /// - everything else: Glorot (`sqrt(2 / (fan_in + fan_out))`)
    pub fn weight_init_std(self, fan_in: usize, fan_out: usize) -> f64 {
        match self {
            Activation::ReLU | Activation::LeakyReLU { .. } | Activation::ELU { .. } => {
                (2.0 / fan_in.max(1) as f64).sqrt()
            }
            Activation::Sigmoid
            | Activation::Softmax
            | Activation::TanH
            | Activation::SoftPlus
            | Activation::Linear => (2.0 / (fan_in + fan_out).max(1) as f64).sqrt(),
        }
    }

    /// Range of values the activation can produce.
    pub fn output_range(self) -> (f64, f64) {
        match self {
            Activation::Sigmoid | Activation::Softmax => (0.0, 1.0),
            Activation::TanH => (-1.0, 1.0),
            Activation::ReLU | Activation::SoftPlus => (0.0, f64::INFINITY),
            Activation::ELU { alpha } => (-alpha, f64::INFINITY),
            Activation::LeakyReLU { .. } | Activation::Linear => {
                (f64::NEG_INFINITY, f64::INFINITY)
            }
        }
    }

    /// Scalar activation.
    ///
    /// Softmax has no scalar form; use [`Activation::compute_vec`].
    #[inline]
    pub fn compute(self, x: f64) -> f64 {
        match self {
            Activation::Sigmoid => sigmoid(x),
            Activation::TanH => x.tanh(),
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::ELU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
            Activation::SoftPlus => softplus(x),
            Activation::Linear => x,
            Activation::Softmax => panic!("softmax is a vector activation"),
        }
    }

    /// Vector activation: `out[i] = f(sums)[i]`.
    #[inline]
    pub fn compute_vec(self, sums: &[f64], out: &mut [f64]) {
        debug_assert_eq!(sums.len(), out.len());

        match self {
            Activation::Softmax => softmax(sums, out),
            _ => {
                for (o, &z) in out.iter_mut().zip(sums) {
                    *o = self.compute(z);
                }
            }
        }
    }

    /// Derivative `f'(sum)` given the sum and the activation it produced.
    ///
    /// For Softmax this is the diagonal of the Jacobian, `a (1 - a)`.
    #[inline]
    pub fn derivative(self, sum: f64, activation: f64) -> f64 {
        match self {
            Activation::Sigmoid | Activation::Softmax => activation * (1.0 - activation),
            Activation::TanH => 1.0 - activation * activation,
            Activation::ReLU => {
                if sum > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if sum > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::ELU { alpha } => {
                if sum > 0.0 {
                    1.0
                } else {
                    activation + alpha
                }
            }
            Activation::SoftPlus => sigmoid(sum),
            Activation::Linear => 1.0,
        }
    }
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

#[inline]
fn softplus(x: f64) -> f64 {
    // ln(1 + e^x) without overflow for large x.
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

#[inline]
fn softmax(sums: &[f64], out: &mut [f64]) {
    let max = sums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for (o, &z) in out.iter_mut().zip(sums) {
        *o = (z - max).exp();
        total += *o;
    }
    let inv = 1.0 / total;
    for o in out.iter_mut() {
        *o *= inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_must_be_finite_and_non_negative() {
        assert!(
            Activation::LeakyReLU { alpha: f64::NAN }
                .validate()
                .is_err()
        );
        assert!(Activation::ELU { alpha: -0.1 }.validate().is_err());
        assert!(Activation::LeakyReLU { alpha: 0.1 }.validate().is_ok());
    }

    #[test]
    fn sigmoid_basic_values() {
        let y0 = Activation::Sigmoid.compute(0.0);
        assert!((y0 - 0.5).abs() < 1e-12);
        assert!(Activation::Sigmoid.compute(40.0) > 0.999);
        assert!(Activation::Sigmoid.compute(-40.0) < 0.001);
    }

    #[test]
    fn softmax_sums_to_one_and_survives_large_sums() {
        let sums = [1000.0, 1001.0, 999.0];
        let mut out = [0.0; 3];
        Activation::Softmax.compute_vec(&sums, &mut out);
        let total: f64 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(out[1] > out[0] && out[0] > out[2]);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let eps = 1e-6;
        let acts = [
            Activation::Sigmoid,
            Activation::TanH,
            Activation::LeakyReLU { alpha: 0.1 },
            Activation::ELU { alpha: 1.0 },
            Activation::SoftPlus,
            Activation::Linear,
        ];
        for act in acts {
            for &z in &[-1.3, -0.2, 0.4, 2.1] {
                let numeric = (act.compute(z + eps) - act.compute(z - eps)) / (2.0 * eps);
                let analytic = act.derivative(z, act.compute(z));
                assert!(
                    (numeric - analytic).abs() < 1e-5,
                    "{act:?} at {z}: analytic={analytic} numeric={numeric}"
                );
            }
        }
    }

    #[test]
    fn init_std_depends_on_fan() {
        let he = Activation::ReLU.weight_init_std(8, 4);
        assert!((he - 0.5).abs() < 1e-12);
        let glorot = Activation::TanH.weight_init_std(3, 5);
        assert!((glorot - 0.5).abs() < 1e-12);
    }

    #[test]
    fn softmax_is_not_droppable() {
        assert!(!Activation::Softmax.supports_dropout());
        assert!(Activation::ReLU.supports_dropout());
    }
}
