//! Network model configuration.
//!
//! Configuration structs are plain data with public fields and `Default` impls. They
//! are validated eagerly by [`NetworkModelConfig::check`]; nothing is re-validated
//! during training.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Optimizer, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Kind of prediction task. Decides the output activation and loss.
pub enum TaskType {
    Regression,
    /// Independent yes/no decisions, one per output.
    Binary,
    /// One-hot classification over the outputs.
    Categorical,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// L1 (lasso) and L2 (ridge) weight penalties.
pub struct Regularization {
    pub lasso: f64,
    pub ridge: f64,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// Bounds on the L2 norm of each neuron's incoming weights.
///
/// Disabled when `max_norm == 0`.
pub struct NormConstraint {
    pub min_norm: f64,
    pub max_norm: f64,
    /// Include the neuron's bias in the norm.
    pub include_bias: bool,
}

impl NormConstraint {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.max_norm > 0.0
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HiddenLayerConfig {
    pub neurons: usize,
    pub activation: Activation,
    /// Dropout probability applied to this layer's outputs during training.
    pub dropout: f64,
    pub regularization: Regularization,
    pub norm: NormConstraint,
}

impl HiddenLayerConfig {
    pub fn new(neurons: usize, activation: Activation) -> Self {
        Self {
            neurons,
            activation,
            dropout: 0.0,
            regularization: Regularization::default(),
            norm: NormConstraint::default(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputOptions {
    /// Dropout probability applied to the network inputs during training.
    pub dropout: f64,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutputOptions {
    pub regularization: Regularization,
    pub norm: NormConstraint,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Mini-batch size policy.
pub enum BatchSize {
    /// Chosen from the optimizer and the dataset size.
    #[default]
    Auto,
    /// Whole dataset per batch (BGD).
    Full,
    /// Fixed size, capped at the dataset size.
    Fixed(usize),
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Early-training learning permeability schedule.
///
/// Permeability is `initial_permeability` at the first epoch of every attempt and
/// opens linearly to reach 1.0 at epoch `ramp_epochs`.
pub struct ThrottleValve {
    pub initial_permeability: f64,
    pub ramp_epochs: usize,
}

impl ThrottleValve {
    /// Permeability for a 1-based attempt epoch.
    pub fn permeability(&self, epoch: usize) -> f64 {
        if self.ramp_epochs <= 1 || epoch >= self.ramp_epochs {
            return 1.0;
        }
        let progress = epoch.saturating_sub(1) as f64 / (self.ramp_epochs - 1) as f64;
        self.initial_permeability + (1.0 - self.initial_permeability) * progress
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
/// Everything needed to build and train one network model.
pub struct NetworkModelConfig {
    pub hidden_layers: Vec<HiddenLayerConfig>,
    pub input: InputOptions,
    pub output: OutputOptions,
    pub optimizer: Optimizer,
    pub batch_size: BatchSize,
    /// Global L2 gradient norm cap (0 = off). Exclusive with `clip_value`.
    pub clip_norm: f64,
    /// Per-gradient absolute value cap (0 = off). Exclusive with `clip_norm`.
    pub clip_value: f64,
    /// Scale loss gradients by inverse effective class frequency.
    pub class_balanced_loss: bool,
    pub throttle_valve: Option<ThrottleValve>,
    pub max_attempts: usize,
    pub max_attempt_epochs: usize,
    /// Fraction of `max_attempt_epochs` an attempt may go without improving.
    pub stop_patience_ratio: f64,
}

impl Default for NetworkModelConfig {
    fn default() -> Self {
        Self {
            hidden_layers: Vec::new(),
            input: InputOptions::default(),
            output: OutputOptions::default(),
            optimizer: Optimizer::default(),
            batch_size: BatchSize::Auto,
            clip_norm: 0.0,
            clip_value: 0.0,
            class_balanced_loss: false,
            throttle_valve: None,
            max_attempts: 1,
            max_attempt_epochs: 200,
            stop_patience_ratio: 1.0,
        }
    }
}

impl NetworkModelConfig {
    /// Validate the whole configuration.
    pub fn check(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts must be > 0".to_owned()));
        }
        if self.max_attempt_epochs == 0 {
            return Err(Error::InvalidConfig(
                "max_attempt_epochs must be > 0".to_owned(),
            ));
        }
        if !(self.stop_patience_ratio > 0.0 && self.stop_patience_ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "stop_patience_ratio must be in (0,1], got {}",
                self.stop_patience_ratio
            )));
        }

        self.optimizer.validate()?;
        check_dropout("input", self.input.dropout)?;

        for (i, layer) in self.hidden_layers.iter().enumerate() {
            if layer.neurons == 0 {
                return Err(Error::InvalidConfig(format!(
                    "hidden layer {i} must have > 0 neurons"
                )));
            }
            layer.activation.validate()?;
            if !layer.activation.is_elementwise() {
                return Err(Error::InvalidConfig(format!(
                    "hidden layer {i} cannot use {:?}",
                    layer.activation
                )));
            }
            check_dropout(&format!("hidden layer {i}"), layer.dropout)?;
            if layer.dropout > 0.0 && !layer.activation.supports_dropout() {
                return Err(Error::InvalidConfig(format!(
                    "hidden layer {i}: dropout is not supported after {:?}",
                    layer.activation
                )));
            }
            check_regularization(&format!("hidden layer {i}"), &layer.regularization)?;
            check_norm(&format!("hidden layer {i}"), &layer.norm)?;
        }
        check_regularization("output", &self.output.regularization)?;
        check_norm("output", &self.output.norm)?;

        if !(self.clip_norm.is_finite() && self.clip_norm >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "clip_norm must be finite and >= 0, got {}",
                self.clip_norm
            )));
        }
        if !(self.clip_value.is_finite() && self.clip_value >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "clip_value must be finite and >= 0, got {}",
                self.clip_value
            )));
        }
        if self.clip_norm > 0.0 && self.clip_value > 0.0 {
            return Err(Error::InvalidConfig(
                "clip_norm and clip_value are mutually exclusive".to_owned(),
            ));
        }

        if let BatchSize::Fixed(size) = self.batch_size {
            if size == 0 {
                return Err(Error::InvalidConfig("batch size must be > 0".to_owned()));
            }
            if self.optimizer.is_rprop() {
                return Err(Error::InvalidConfig(
                    "RProp requires full-batch training (batch size Auto or Full)".to_owned(),
                ));
            }
        }
        if self.optimizer.is_rprop() && self.uses_dropout() {
            return Err(Error::InvalidConfig(
                "RProp cannot be combined with dropout".to_owned(),
            ));
        }

        if let Some(valve) = &self.throttle_valve {
            if !(valve.initial_permeability > 0.0 && valve.initial_permeability <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "throttle valve initial_permeability must be in (0,1], got {}",
                    valve.initial_permeability
                )));
            }
        }

        Ok(())
    }

    /// True if any input or hidden dropout is configured.
    pub fn uses_dropout(&self) -> bool {
        self.input.dropout > 0.0 || self.hidden_layers.iter().any(|l| l.dropout > 0.0)
    }
}

fn check_dropout(what: &str, p: f64) -> Result<()> {
    if !(p.is_finite() && (0.0..1.0).contains(&p)) {
        return Err(Error::InvalidConfig(format!(
            "{what} dropout must be in [0,1), got {p}"
        )));
    }
    Ok(())
}

fn check_regularization(what: &str, reg: &Regularization) -> Result<()> {
    if !(reg.lasso.is_finite() && reg.lasso >= 0.0 && reg.ridge.is_finite() && reg.ridge >= 0.0)
    {
        return Err(Error::InvalidConfig(format!(
            "{what} lasso/ridge must be finite and >= 0, got {}/{}",
            reg.lasso, reg.ridge
        )));
    }
    Ok(())
}

fn check_norm(what: &str, norm: &NormConstraint) -> Result<()> {
    if !(norm.max_norm.is_finite() && norm.max_norm >= 0.0) {
        return Err(Error::InvalidConfig(format!(
            "{what} max_norm must be finite and >= 0, got {}",
            norm.max_norm
        )));
    }
    if !(norm.min_norm.is_finite() && norm.min_norm >= 0.0) {
        return Err(Error::InvalidConfig(format!(
            "{what} min_norm must be finite and >= 0, got {}",
            norm.min_norm
        )));
    }
    if norm.is_enabled() && norm.min_norm > norm.max_norm {
        return Err(Error::InvalidConfig(format!(
            "{what} min_norm {} exceeds max_norm {}",
            norm.min_norm, norm.max_norm
        )));
    }
    Ok(())
}
