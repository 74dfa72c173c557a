//! Optimizers.
//!
//! An optimizer turns a (batch-averaged) gradient vector into an in-place update of the
//! flat weight buffer.
//!
//! Design notes:
//! - [`Optimizer`] holds hyperparameters only; [`OptimizerState`] owns the per-weight
//!   accumulators sized to the weight count.
//! - `update` is the only place that mutates weights during training.
//! - Weights whose `active` flag is false (e.g. every input of the weight was dropped
//!   out in the batch) are skipped entirely: their accumulators are not touched.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Optimizer choice and hyperparameters.
pub enum Optimizer {
    /// SGD with optional momentum and linear learning-rate annealing.
    ///
    /// The learning rate decays linearly from `lr` (first epoch) to
    /// `lr * final_lr_ratio` (last epoch of an attempt).
    Sgd {
        lr: f64,
        momentum: f64,
        final_lr_ratio: f64,
    },
    /// Adam (bias-corrected).
    Adam {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
    },
    /// AdaBelief: second moment tracks `(g - m)^2` instead of `g^2`.
    Adabelief {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
    },
    /// Partially adaptive Adam: `p = 0.5` is AMSGrad, `p = 0` is momentum SGD.
    Padam {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        p: f64,
    },
    /// Adam over the infinity norm.
    Adamax {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
    },
    Adagrad {
        lr: f64,
        eps: f64,
    },
    Adadelta {
        lr: f64,
        rho: f64,
        eps: f64,
    },
    RmsProp {
        lr: f64,
        rho: f64,
        eps: f64,
    },
    /// Resilient propagation (iRprop+). Full-batch only, no dropout.
    RProp {
        initial_step: f64,
        min_step: f64,
        max_step: f64,
        eta_plus: f64,
        eta_minus: f64,
    },
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::adam(1e-3)
    }
}

impl Optimizer {
    pub fn sgd(lr: f64) -> Self {
        Optimizer::Sgd {
            lr,
            momentum: 0.0,
            final_lr_ratio: 1.0,
        }
    }

    pub fn adam(lr: f64) -> Self {
        Optimizer::Adam {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }

    pub fn adabelief(lr: f64) -> Self {
        Optimizer::Adabelief {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-12,
        }
    }

    pub fn padam(lr: f64, p: f64) -> Self {
        Optimizer::Padam {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            p,
        }
    }

    pub fn adamax(lr: f64) -> Self {
        Optimizer::Adamax {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }

    pub fn adagrad(lr: f64) -> Self {
        Optimizer::Adagrad { lr, eps: 1e-8 }
    }

    pub fn adadelta() -> Self {
        Optimizer::Adadelta {
            lr: 1.0,
            rho: 0.95,
            eps: 1e-6,
        }
    }

    pub fn rmsprop(lr: f64) -> Self {
        Optimizer::RmsProp {
            lr,
            rho: 0.9,
            eps: 1e-8,
        }
    }

    pub fn rprop() -> Self {
        Optimizer::RProp {
            initial_step: 0.1,
            min_step: 1e-6,
            max_step: 50.0,
            eta_plus: 1.2,
            eta_minus: 0.5,
        }
    }

    #[inline]
    pub fn is_rprop(&self) -> bool {
        matches!(self, Optimizer::RProp { .. })
    }

    #[inline]
    pub fn is_sgd(&self) -> bool {
        matches!(self, Optimizer::Sgd { .. })
    }

    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd {
                lr,
                momentum,
                final_lr_ratio,
            } => {
                check_lr(lr)?;
                check_unit("sgd momentum", momentum)?;
                if !(final_lr_ratio.is_finite() && final_lr_ratio > 0.0 && final_lr_ratio <= 1.0)
                {
                    return Err(Error::InvalidConfig(format!(
                        "sgd final_lr_ratio must be in (0,1], got {final_lr_ratio}"
                    )));
                }
            }
            Optimizer::Adam {
                lr,
                beta1,
                beta2,
                eps,
            }
            | Optimizer::Adabelief {
                lr,
                beta1,
                beta2,
                eps,
            }
            | Optimizer::Adamax {
                lr,
                beta1,
                beta2,
                eps,
            } => {
                check_lr(lr)?;
                check_unit("beta1", beta1)?;
                check_unit("beta2", beta2)?;
                check_eps(eps)?;
            }
            Optimizer::Padam {
                lr,
                beta1,
                beta2,
                eps,
                p,
            } => {
                check_lr(lr)?;
                check_unit("beta1", beta1)?;
                check_unit("beta2", beta2)?;
                check_eps(eps)?;
                if !(p.is_finite() && (0.0..=0.5).contains(&p)) {
                    return Err(Error::InvalidConfig(format!(
                        "padam p must be in [0,0.5], got {p}"
                    )));
                }
            }
            Optimizer::Adagrad { lr, eps } => {
                check_lr(lr)?;
                check_eps(eps)?;
            }
            Optimizer::Adadelta { lr, rho, eps } | Optimizer::RmsProp { lr, rho, eps } => {
                check_lr(lr)?;
                check_unit("rho", rho)?;
                check_eps(eps)?;
            }
            Optimizer::RProp {
                initial_step,
                min_step,
                max_step,
                eta_plus,
                eta_minus,
            } => {
                if !(min_step.is_finite() && min_step > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop min_step must be finite and > 0, got {min_step}"
                    )));
                }
                if !(max_step.is_finite() && max_step >= min_step) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop max_step must be finite and >= min_step, got {max_step}"
                    )));
                }
                if !(min_step..=max_step).contains(&initial_step) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop initial_step must be in [min_step,max_step], got {initial_step}"
                    )));
                }
                if !(eta_plus.is_finite() && eta_plus > 1.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop eta_plus must be > 1, got {eta_plus}"
                    )));
                }
                if !(eta_minus > 0.0 && eta_minus < 1.0) {
                    return Err(Error::InvalidConfig(format!(
                        "rprop eta_minus must be in (0,1), got {eta_minus}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Allocate optimizer state for `num_weights` weights.
    pub fn state(self, num_weights: usize) -> Result<OptimizerState> {
        self.validate()?;

        let zeros = || vec![0.0; num_weights];
        let state = match self {
            Optimizer::Sgd {
                lr,
                momentum,
                final_lr_ratio,
            } => OptimizerState::Sgd {
                lr,
                momentum,
                final_lr_ratio,
                current_lr: lr,
                velocity: zeros(),
            },
            Optimizer::Adam {
                lr,
                beta1,
                beta2,
                eps,
            } => OptimizerState::Adam {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: zeros(),
                v: zeros(),
            },
            Optimizer::Adabelief {
                lr,
                beta1,
                beta2,
                eps,
            } => OptimizerState::Adabelief {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: zeros(),
                s: zeros(),
            },
            Optimizer::Padam {
                lr,
                beta1,
                beta2,
                eps,
                p,
            } => OptimizerState::Padam {
                lr,
                beta1,
                beta2,
                eps,
                p,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: zeros(),
                v: zeros(),
                max_v: zeros(),
            },
            Optimizer::Adamax {
                lr,
                beta1,
                beta2,
                eps,
            } => OptimizerState::Adamax {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow: 1.0,
                m: zeros(),
                u: zeros(),
            },
            Optimizer::Adagrad { lr, eps } => OptimizerState::Adagrad {
                lr,
                eps,
                sum_sq: zeros(),
            },
            Optimizer::Adadelta { lr, rho, eps } => OptimizerState::Adadelta {
                lr,
                rho,
                eps,
                avg_sq_grad: zeros(),
                avg_sq_delta: zeros(),
            },
            Optimizer::RmsProp { lr, rho, eps } => OptimizerState::RmsProp {
                lr,
                rho,
                eps,
                avg_sq_grad: zeros(),
            },
            Optimizer::RProp {
                initial_step,
                min_step,
                max_step,
                eta_plus,
                eta_minus,
            } => OptimizerState::RProp {
                initial_step,
                min_step,
                max_step,
                eta_plus,
                eta_minus,
                prev_cost: f64::INFINITY,
                prev_grads: zeros(),
                prev_deltas: zeros(),
                steps: vec![initial_step; num_weights],
            },
        };
        Ok(state)
    }
}

#[derive(Debug, Clone)]
/// Owned optimizer state.
pub enum OptimizerState {
    Sgd {
        lr: f64,
        momentum: f64,
        final_lr_ratio: f64,
        current_lr: f64,
        velocity: Vec<f64>,
    },
    Adam {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        beta1_pow: f64,
        beta2_pow: f64,
        m: Vec<f64>,
        v: Vec<f64>,
    },
    Adabelief {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        beta1_pow: f64,
        beta2_pow: f64,
        m: Vec<f64>,
        s: Vec<f64>,
    },
    Padam {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        p: f64,
        beta1_pow: f64,
        beta2_pow: f64,
        m: Vec<f64>,
        v: Vec<f64>,
        max_v: Vec<f64>,
    },
    Adamax {
        lr: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        beta1_pow: f64,
        m: Vec<f64>,
        u: Vec<f64>,
    },
    Adagrad {
        lr: f64,
        eps: f64,
        sum_sq: Vec<f64>,
    },
    Adadelta {
        lr: f64,
        rho: f64,
        eps: f64,
        avg_sq_grad: Vec<f64>,
        avg_sq_delta: Vec<f64>,
    },
    RmsProp {
        lr: f64,
        rho: f64,
        eps: f64,
        avg_sq_grad: Vec<f64>,
    },
    RProp {
        initial_step: f64,
        min_step: f64,
        max_step: f64,
        eta_plus: f64,
        eta_minus: f64,
        prev_cost: f64,
        prev_grads: Vec<f64>,
        prev_deltas: Vec<f64>,
        steps: Vec<f64>,
    },
}

impl OptimizerState {
    /// Restore attempt-start state: all accumulators zeroed, step counters cleared.
    pub fn reset(&mut self) {
        match self {
            OptimizerState::Sgd {
                lr,
                current_lr,
                velocity,
                ..
            } => {
                *current_lr = *lr;
                velocity.fill(0.0);
            }
            OptimizerState::Adam {
                beta1_pow,
                beta2_pow,
                m,
                v,
                ..
            } => {
                *beta1_pow = 1.0;
                *beta2_pow = 1.0;
                m.fill(0.0);
                v.fill(0.0);
            }
            OptimizerState::Adabelief {
                beta1_pow,
                beta2_pow,
                m,
                s,
                ..
            } => {
                *beta1_pow = 1.0;
                *beta2_pow = 1.0;
                m.fill(0.0);
                s.fill(0.0);
            }
            OptimizerState::Padam {
                beta1_pow,
                beta2_pow,
                m,
                v,
                max_v,
                ..
            } => {
                *beta1_pow = 1.0;
                *beta2_pow = 1.0;
                m.fill(0.0);
                v.fill(0.0);
                max_v.fill(0.0);
            }
            OptimizerState::Adamax {
                beta1_pow, m, u, ..
            } => {
                *beta1_pow = 1.0;
                m.fill(0.0);
                u.fill(0.0);
            }
            OptimizerState::Adagrad { sum_sq, .. } => sum_sq.fill(0.0),
            OptimizerState::Adadelta {
                avg_sq_grad,
                avg_sq_delta,
                ..
            } => {
                avg_sq_grad.fill(0.0);
                avg_sq_delta.fill(0.0);
            }
            OptimizerState::RmsProp { avg_sq_grad, .. } => avg_sq_grad.fill(0.0),
            OptimizerState::RProp {
                initial_step,
                prev_cost,
                prev_grads,
                prev_deltas,
                steps,
                ..
            } => {
                *prev_cost = f64::INFINITY;
                prev_grads.fill(0.0);
                prev_deltas.fill(0.0);
                steps.fill(*initial_step);
            }
        }
    }

    /// Epoch hook. `epoch` is 1-based within the current attempt.
    pub fn new_epoch(&mut self, epoch: usize, max_epoch: usize) {
        if let OptimizerState::Sgd {
            lr,
            final_lr_ratio,
            current_lr,
            ..
        } = self
        {
            let progress = if max_epoch > 1 {
                (epoch.saturating_sub(1)) as f64 / (max_epoch - 1) as f64
            } else {
                0.0
            };
            *current_lr = *lr * (1.0 - (1.0 - *final_lr_ratio) * progress.min(1.0));
        }
    }

    /// Apply one update to `weights`.
    ///
    /// - `permeability` scales the effective learning rate (1.0 = unthrottled).
    /// - `cost` is the batch loss measured with the pre-update weights (used by RProp).
    /// - `active[i] == false` leaves weight `i` and its accumulators untouched.
    ///
    /// Shape contract: `active`, `gradients` and `weights` have the state's weight count.
    pub fn update(
        &mut self,
        permeability: f64,
        cost: f64,
        active: &[bool],
        gradients: &[f64],
        weights: &mut [f64],
    ) {
        assert_eq!(gradients.len(), weights.len());
        assert_eq!(active.len(), weights.len());
        debug_assert!(permeability.is_finite() && permeability > 0.0);

        match self {
            OptimizerState::Sgd {
                momentum,
                current_lr,
                velocity,
                ..
            } => {
                let step = *current_lr * permeability;
                for i in active_indices(active) {
                    velocity[i] = *momentum * velocity[i] + gradients[i];
                    weights[i] -= step * velocity[i];
                }
            }
            OptimizerState::Adam {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;
                let step = *lr * permeability;

                for i in active_indices(active) {
                    let g = gradients[i];
                    m[i] = *beta1 * m[i] + (1.0 - *beta1) * g;
                    v[i] = *beta2 * v[i] + (1.0 - *beta2) * g * g;
                    let m_hat = m[i] / corr1;
                    let v_hat = v[i] / corr2;
                    weights[i] -= step * m_hat / (v_hat.sqrt() + *eps);
                }
            }
            OptimizerState::Adabelief {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow,
                beta2_pow,
                m,
                s,
            } => {
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;
                let step = *lr * permeability;

                for i in active_indices(active) {
                    let g = gradients[i];
                    m[i] = *beta1 * m[i] + (1.0 - *beta1) * g;
                    let belief = g - m[i];
                    s[i] = *beta2 * s[i] + (1.0 - *beta2) * belief * belief + *eps;
                    let m_hat = m[i] / corr1;
                    let s_hat = s[i] / corr2;
                    weights[i] -= step * m_hat / (s_hat.sqrt() + *eps);
                }
            }
            OptimizerState::Padam {
                lr,
                beta1,
                beta2,
                eps,
                p,
                beta1_pow,
                beta2_pow,
                m,
                v,
                max_v,
            } => {
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;
                let step = *lr * permeability;

                for i in active_indices(active) {
                    let g = gradients[i];
                    m[i] = *beta1 * m[i] + (1.0 - *beta1) * g;
                    v[i] = *beta2 * v[i] + (1.0 - *beta2) * g * g;
                    max_v[i] = max_v[i].max(v[i] / corr2);
                    let m_hat = m[i] / corr1;
                    weights[i] -= step * m_hat / (max_v[i] + *eps).powf(*p);
                }
            }
            OptimizerState::Adamax {
                lr,
                beta1,
                beta2,
                eps,
                beta1_pow,
                m,
                u,
            } => {
                *beta1_pow *= *beta1;
                let step = *lr * permeability / (1.0 - *beta1_pow);

                for i in active_indices(active) {
                    let g = gradients[i];
                    m[i] = *beta1 * m[i] + (1.0 - *beta1) * g;
                    u[i] = (*beta2 * u[i]).max(g.abs());
                    weights[i] -= step * m[i] / (u[i] + *eps);
                }
            }
            OptimizerState::Adagrad { lr, eps, sum_sq } => {
                let step = *lr * permeability;
                for i in active_indices(active) {
                    let g = gradients[i];
                    sum_sq[i] += g * g;
                    weights[i] -= step * g / (sum_sq[i].sqrt() + *eps);
                }
            }
            OptimizerState::Adadelta {
                lr,
                rho,
                eps,
                avg_sq_grad,
                avg_sq_delta,
            } => {
                let step = *lr * permeability;
                for i in active_indices(active) {
                    let g = gradients[i];
                    avg_sq_grad[i] = *rho * avg_sq_grad[i] + (1.0 - *rho) * g * g;
                    let delta =
                        (avg_sq_delta[i] + *eps).sqrt() / (avg_sq_grad[i] + *eps).sqrt() * g;
                    avg_sq_delta[i] = *rho * avg_sq_delta[i] + (1.0 - *rho) * delta * delta;
                    weights[i] -= step * delta;
                }
            }
            OptimizerState::RmsProp {
                lr,
                rho,
                eps,
                avg_sq_grad,
            } => {
                let step = *lr * permeability;
                for i in active_indices(active) {
                    let g = gradients[i];
                    avg_sq_grad[i] = *rho * avg_sq_grad[i] + (1.0 - *rho) * g * g;
                    weights[i] -= step * g / (avg_sq_grad[i].sqrt() + *eps);
                }
            }
            OptimizerState::RProp {
                min_step,
                max_step,
                eta_plus,
                eta_minus,
                prev_cost,
                prev_grads,
                prev_deltas,
                steps,
                ..
            } => {
                let cost_increased = cost > *prev_cost;
                for i in active_indices(active) {
                    let g = gradients[i];
                    let agreement = prev_grads[i] * g;
                    if agreement < 0.0 {
                        // Sign flip: overshot a minimum along this weight.
                        steps[i] = (steps[i] * *eta_minus).max(*min_step);
                        if cost_increased {
                            weights[i] -= prev_deltas[i];
                        }
                        prev_deltas[i] = 0.0;
                        prev_grads[i] = 0.0;
                    } else {
                        if agreement > 0.0 {
                            steps[i] = (steps[i] * *eta_plus).min(*max_step);
                        }
                        let delta = -sign(g) * steps[i] * permeability;
                        weights[i] += delta;
                        prev_deltas[i] = delta;
                        prev_grads[i] = g;
                    }
                }
                *prev_cost = cost;
            }
        }
    }
}

#[inline]
fn active_indices(active: &[bool]) -> impl Iterator<Item = usize> + '_ {
    active
        .iter()
        .enumerate()
        .filter_map(|(i, &on)| on.then_some(i))
}

#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn check_lr(lr: f64) -> Result<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "learning rate must be finite and > 0, got {lr}"
        )));
    }
    Ok(())
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && (0.0..1.0).contains(&value)) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be finite and in [0,1), got {value}"
        )));
    }
    Ok(())
}

fn check_eps(eps: f64) -> Result<()> {
    if !(eps.is_finite() && eps > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "eps must be finite and > 0, got {eps}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_active(n: usize) -> Vec<bool> {
        vec![true; n]
    }

    #[test]
    fn validation_rejects_bad_hyperparams() {
        assert!(Optimizer::sgd(0.0).validate().is_err());
        assert!(Optimizer::sgd(f64::NAN).validate().is_err());
        assert!(
            Optimizer::Sgd {
                lr: 0.1,
                momentum: 1.0,
                final_lr_ratio: 1.0
            }
            .validate()
            .is_err()
        );
        assert!(
            Optimizer::Adam {
                lr: 1e-3,
                beta1: 1.0,
                beta2: 0.999,
                eps: 1e-8
            }
            .validate()
            .is_err()
        );
        assert!(Optimizer::padam(0.1, 0.6).validate().is_err());
        assert!(Optimizer::padam(0.1, 0.5).validate().is_ok());
        assert!(
            Optimizer::RProp {
                initial_step: 0.1,
                min_step: 1e-6,
                max_step: 50.0,
                eta_plus: 1.2,
                eta_minus: 1.5
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn sgd_momentum_first_step_is_plain_sgd() {
        let mut opt = Optimizer::Sgd {
            lr: 0.1,
            momentum: 0.9,
            final_lr_ratio: 1.0,
        }
        .state(2)
        .unwrap();
        let mut w = [1.0, 2.0];
        opt.update(1.0, 0.0, &all_active(2), &[3.0, 4.0], &mut w);
        assert!((w[0] - 0.7).abs() < 1e-12);
        assert!((w[1] - 1.6).abs() < 1e-12);

        // Second step accumulates velocity: v = 0.9 * 3 + 3 = 5.7.
        opt.update(1.0, 0.0, &all_active(2), &[3.0, 4.0], &mut w);
        assert!((w[0] - (0.7 - 0.57)).abs() < 1e-12);
    }

    #[test]
    fn sgd_anneals_learning_rate_over_epochs() {
        let mut opt = Optimizer::Sgd {
            lr: 1.0,
            momentum: 0.0,
            final_lr_ratio: 0.1,
        }
        .state(1)
        .unwrap();
        opt.new_epoch(11, 11);
        let mut w = [0.0];
        opt.update(1.0, 0.0, &[true], &[1.0], &mut w);
        assert!((w[0] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn adam_first_step_for_unit_grad() {
        let mut opt = Optimizer::Adam {
            lr: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1.0,
        }
        .state(1)
        .unwrap();
        let mut w = [1.0];
        opt.update(1.0, 0.0, &[true], &[1.0], &mut w);
        // m_hat = v_hat = 1, update = 1 / (1 + eps) = 0.5.
        assert!((w[0] - 0.95).abs() < 1e-12);
    }

    #[test]
    fn padam_with_zero_exponent_behaves_like_momentum() {
        let mut opt = Optimizer::padam(0.1, 0.0).state(1).unwrap();
        let mut w = [0.0];
        opt.update(1.0, 0.0, &[true], &[2.0], &mut w);
        // (maxV + eps)^0 == 1, bias-corrected m == g.
        assert!((w[0] + 0.2).abs() < 1e-12);
    }

    #[test]
    fn padam_keeps_running_max_of_second_moment() {
        let mut opt = Optimizer::padam(0.1, 0.5).state(1).unwrap();
        let mut w = [0.0];
        opt.update(1.0, 0.0, &[true], &[10.0], &mut w);
        opt.update(1.0, 0.0, &[true], &[0.0], &mut w);
        let OptimizerState::Padam { v, max_v, .. } = &opt else {
            panic!("expected padam state");
        };
        assert!(max_v[0] >= v[0]);
        assert!(max_v[0] > 50.0);
    }

    #[test]
    fn rprop_grows_step_on_agreement_and_reverts_on_flip() {
        let mut opt = Optimizer::rprop().state(1).unwrap();
        let mut w = [0.0];
        opt.update(1.0, 1.0, &[true], &[1.0], &mut w);
        assert!((w[0] + 0.1).abs() < 1e-12);
        opt.update(1.0, 0.9, &[true], &[1.0], &mut w);
        assert!((w[0] + 0.1 + 0.12).abs() < 1e-12);

        // Gradient flips sign and cost went up: last step is reverted.
        opt.update(1.0, 2.0, &[true], &[-1.0], &mut w);
        assert!((w[0] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn inactive_weights_are_untouched() {
        let mut opt = Optimizer::adam(0.1).state(2).unwrap();
        let mut w = [1.0, 1.0];
        opt.update(1.0, 0.0, &[true, false], &[1.0, 1.0], &mut w);
        assert!(w[0] < 1.0);
        assert_eq!(w[1], 1.0);
        let OptimizerState::Adam { m, .. } = &opt else {
            panic!("expected adam state");
        };
        assert_eq!(m[1], 0.0);
    }

    #[test]
    fn reset_restores_attempt_start_state() {
        let mut opt = Optimizer::adam(0.1).state(1).unwrap();
        let mut w = [1.0];
        opt.update(1.0, 0.0, &[true], &[1.0], &mut w);
        opt.reset();

        let mut fresh = Optimizer::adam(0.1).state(1).unwrap();
        let mut w_a = [0.5];
        let mut w_b = [0.5];
        opt.update(1.0, 0.0, &[true], &[0.3], &mut w_a);
        fresh.update(1.0, 0.0, &[true], &[0.3], &mut w_b);
        assert_eq!(w_a, w_b);
    }

    #[test]
    fn every_optimizer_descends_on_a_quadratic() {
        let optimizers = [
            Optimizer::sgd(0.1),
            Optimizer::adam(0.05),
            Optimizer::adabelief(0.05),
            Optimizer::padam(0.05, 0.25),
            Optimizer::adamax(0.05),
            Optimizer::adagrad(0.2),
            Optimizer::adadelta(),
            Optimizer::rmsprop(0.01),
            Optimizer::rprop(),
        ];
        for cfg in optimizers {
            let mut opt = cfg.state(1).unwrap();
            let mut w = [3.0];
            for _ in 0..200 {
                let cost = w[0] * w[0];
                let g = [2.0 * w[0]];
                opt.update(1.0, cost, &[true], &g, &mut w);
            }
            assert!(w[0].abs() < 3.0, "{cfg:?} did not descend: w={}", w[0]);
        }
    }
}
