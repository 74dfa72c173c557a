#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// How input data is fed into the reservoir.
pub enum InputFeeding {
    /// Continuous stream of time points; state is never reset between pushes.
    #[default]
    TimePoint,
    /// Independent patterns of exactly `data_length` values.
    PatternConstLength,
    /// Independent patterns of up to `data_length` values.
    PatternVarLength,
}

impl InputFeeding {
    #[inline]
    pub fn is_pattern(self) -> bool {
        !matches!(self, InputFeeding::TimePoint)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirInputConfig {
    /// Number of input variables per time point.
    pub num_variables: usize,
    /// Flat length of one input (time-major, variables interleaved).
    ///
    /// Equals `num_variables` for time-point feeding; a multiple of it for patterns.
    pub data_length: usize,
    pub feeding: InputFeeding,
    /// Fraction of input variables each hidden neuron listens to.
    pub density: f64,
    pub max_delay: usize,
    pub max_strength: f64,
}

impl Default for ReservoirInputConfig {
    fn default() -> Self {
        Self {
            num_variables: 1,
            data_length: 1,
            feeding: InputFeeding::TimePoint,
            density: 1.0,
            max_delay: 0,
            max_strength: 1.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirHiddenConfig {
    pub num_neurons: usize,
    /// Fraction of the other hidden neurons each neuron receives a connection from.
    pub density: f64,
    pub max_delay: usize,
    pub activation: Activation,
    /// Leaky-integrator memory: share of the previous activation kept each step.
    pub retainment: f64,
    /// Minimal activation rise that counts as a spike.
    pub spike_threshold: f64,
    pub spectral_radius: f64,
    /// Weight of the newest spike power in the fading trace.
    pub spikes_fading: f64,
}

impl Default for ReservoirHiddenConfig {
    fn default() -> Self {
        Self {
            num_neurons: 100,
            density: 0.1,
            max_delay: 0,
            activation: Activation::TanH,
            retainment: 0.0,
            spike_threshold: 0.05,
            spectral_radius: 0.9,
            spikes_fading: 0.5,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which predictor kinds the reservoir emits.
pub struct PredictorsConfig {
    pub activation: bool,
    pub squared_activation: bool,
    pub spikes_fading_trace: bool,
}

impl Default for PredictorsConfig {
    fn default() -> Self {
        Self {
            activation: true,
            squared_activation: false,
            spikes_fading_trace: false,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReservoirConfig {
    pub input: ReservoirInputConfig,
    pub hidden: ReservoirHiddenConfig,
    pub predictors: PredictorsConfig,
}

impl ReservoirConfig {
    pub fn check(&self) -> Result<()> {
        let input = &self.input;
        if input.num_variables == 0 {
            return Err(Error::InvalidConfig(
                "reservoir num_variables must be > 0".to_owned(),
            ));
        }
        if input.data_length == 0 || input.data_length % input.num_variables != 0 {
            return Err(Error::InvalidConfig(format!(
                "reservoir data_length {} must be a positive multiple of num_variables {}",
                input.data_length, input.num_variables
            )));
        }
        if input.feeding == InputFeeding::TimePoint && input.data_length != input.num_variables {
            return Err(Error::InvalidConfig(format!(
                "time-point feeding needs data_length == num_variables, got {} != {}",
                input.data_length, input.num_variables
            )));
        }
        check_density("input", input.density)?;
        if !(input.max_strength.is_finite() && input.max_strength > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "input max_strength must be finite and > 0, got {}",
                input.max_strength
            )));
        }

        let hidden = &self.hidden;
        if hidden.num_neurons == 0 {
            return Err(Error::InvalidConfig(
                "reservoir num_neurons must be > 0".to_owned(),
            ));
        }
        check_density("hidden", hidden.density)?;
        hidden.activation.validate()?;
        if !hidden.activation.is_elementwise() {
            return Err(Error::InvalidConfig(format!(
                "reservoir neurons cannot use {:?}",
                hidden.activation
            )));
        }
        if !(hidden.retainment.is_finite() && (0.0..1.0).contains(&hidden.retainment)) {
            return Err(Error::InvalidConfig(format!(
                "retainment must be in [0,1), got {}",
                hidden.retainment
            )));
        }
        if !(hidden.spike_threshold.is_finite() && hidden.spike_threshold > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "spike_threshold must be finite and > 0, got {}",
                hidden.spike_threshold
            )));
        }
        if !(hidden.spectral_radius.is_finite() && hidden.spectral_radius > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "spectral_radius must be finite and > 0, got {}",
                hidden.spectral_radius
            )));
        }
        if !(hidden.spikes_fading > 0.0 && hidden.spikes_fading <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "spikes_fading must be in (0,1], got {}",
                hidden.spikes_fading
            )));
        }

        let p = &self.predictors;
        if !(p.activation || p.squared_activation || p.spikes_fading_trace) {
            return Err(Error::InvalidConfig(
                "at least one reservoir predictor must be enabled".to_owned(),
            ));
        }
        Ok(())
    }
}

fn check_density(what: &str, density: f64) -> Result<()> {
    if !(density > 0.0 && density <= 1.0) {
        return Err(Error::InvalidConfig(format!(
            "{what} density must be in (0,1], got {density}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ReservoirConfig::default().check().is_ok());
    }

    #[test]
    fn pattern_length_must_be_multiple_of_variables() {
        let mut cfg = ReservoirConfig::default();
        cfg.input.num_variables = 3;
        cfg.input.data_length = 10;
        cfg.input.feeding = InputFeeding::PatternConstLength;
        assert!(cfg.check().is_err());
        cfg.input.data_length = 12;
        assert!(cfg.check().is_ok());

        cfg.input.feeding = InputFeeding::TimePoint;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn ranges_are_checked() {
        let mut cfg = ReservoirConfig::default();
        cfg.hidden.retainment = 1.0;
        assert!(cfg.check().is_err());

        let mut cfg = ReservoirConfig::default();
        cfg.hidden.density = 0.0;
        assert!(cfg.check().is_err());

        let mut cfg = ReservoirConfig::default();
        cfg.hidden.activation = Activation::Softmax;
        assert!(cfg.check().is_err());

        let mut cfg = ReservoirConfig::default();
        cfg.predictors.activation = false;
        assert!(cfg.check().is_err());
    }
}
