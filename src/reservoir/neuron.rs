#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::synapse::{Synapse, SynapseSource};
use crate::Activation;

/// Spike power is quantized into this many levels.
const SPIKE_POWER_LEVELS: u32 = 8;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Kind of value a hidden neuron contributes to the reservoir output.
pub enum Predictor {
    Activation,
    /// Sign-preserving square of the activation.
    SquaredActivation,
    /// Exponentially fading trace of spike powers.
    SpikesFadingTrace,
}

impl Predictor {
    pub const COUNT: usize = 3;

    /// All kinds, in output section order.
    pub const ALL: [Predictor; Self::COUNT] = [
        Predictor::Activation,
        Predictor::SquaredActivation,
        Predictor::SpikesFadingTrace,
    ];

    /// Slot of this kind in per-neuron predictor arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Predictor::Activation => 0,
            Predictor::SquaredActivation => 1,
            Predictor::SpikesFadingTrace => 2,
        }
    }
}

/// Leaky-integrator neuron with spike detection.
#[derive(Debug, Clone)]
pub struct ReservoirNeuron {
    pub index: usize,
    pub activation_fn: Activation,
    pub bias: f64,
    pub input_synapses: Vec<Synapse>,
    pub hidden_synapses: Vec<Synapse>,
    retainment: f64,
    fading: f64,
    spike_threshold: f64,
    pub(crate) stimuli: f64,
    activation: f64,
    prev_activation: f64,
    predictors: [f64; Predictor::COUNT],
    switches: [bool; Predictor::COUNT],
}

impl ReservoirNeuron {
    /// Identity neuron holding one input variable.
    pub fn new_input(index: usize) -> Self {
        Self {
            index,
            activation_fn: Activation::Linear,
            bias: 0.0,
            input_synapses: Vec::new(),
            hidden_synapses: Vec::new(),
            retainment: 0.0,
            fading: 1.0,
            spike_threshold: f64::INFINITY,
            stimuli: 0.0,
            activation: 0.0,
            prev_activation: 0.0,
            predictors: [0.0; Predictor::COUNT],
            switches: [false; Predictor::COUNT],
        }
    }

    pub fn new_hidden(
        index: usize,
        activation_fn: Activation,
        bias: f64,
        retainment: f64,
        spike_threshold: f64,
        fading: f64,
    ) -> Self {
        Self {
            index,
            activation_fn,
            bias,
            input_synapses: Vec::new(),
            hidden_synapses: Vec::new(),
            retainment,
            fading,
            spike_threshold,
            stimuli: 0.0,
            activation: 0.0,
            prev_activation: 0.0,
            predictors: [0.0; Predictor::COUNT],
            switches: [true; Predictor::COUNT],
        }
    }

    #[inline]
    pub fn activation(&self) -> f64 {
        self.activation
    }

    #[inline]
    pub fn prev_activation(&self) -> f64 {
        self.prev_activation
    }

    #[inline]
    pub fn predictor(&self, p: Predictor) -> f64 {
        self.predictors[p.index()]
    }

    /// All predictor values, indexed by [`Predictor::index`].
    #[inline]
    pub fn predictors(&self) -> &[f64; Predictor::COUNT] {
        &self.predictors
    }

    #[inline]
    pub fn is_enabled(&self, p: Predictor) -> bool {
        self.switches[p.index()]
    }

    #[inline]
    pub fn set_enabled(&mut self, p: Predictor, enabled: bool) {
        self.switches[p.index()] = enabled;
    }

    /// Sum of the neuron's incoming delayed signals for one step.
    ///
    /// `inputs` and `hidden` are the presynaptic activations of the previous step.
    pub(crate) fn collect_stimuli(&mut self, inputs: &[f64], hidden: &[f64]) {
        let mut sum = 0.0;
        for s in self
            .input_synapses
            .iter_mut()
            .chain(self.hidden_synapses.iter_mut())
        {
            let presynaptic = match s.source {
                SynapseSource::Input(i) => inputs[i],
                SynapseSource::Hidden(i) => hidden[i],
            };
            sum += s.pull(presynaptic);
        }
        self.stimuli = sum;
    }

    /// Leaky update from `stimuli`, then spike detection and predictor refresh.
    pub fn recompute(&mut self, stimuli: f64) {
        self.stimuli = stimuli;
        self.prev_activation = self.activation;
        let fresh = self.activation_fn.compute(stimuli + self.bias);
        self.activation = self
            .retainment
            .mul_add(self.prev_activation, (1.0 - self.retainment) * fresh);

        let power = spike_power(self.activation - self.prev_activation, self.spike_threshold);
        let trace = self.predictors[Predictor::SpikesFadingTrace.index()];
        self.predictors[Predictor::Activation.index()] = self.activation;
        self.predictors[Predictor::SquaredActivation.index()] =
            self.activation * self.activation.abs();
        self.predictors[Predictor::SpikesFadingTrace.index()] =
            (1.0 - self.fading).mul_add(trace, self.fading * power);
    }

    /// Clear the dynamic state (switches are kept).
    pub fn reset(&mut self) {
        self.stimuli = 0.0;
        self.activation = 0.0;
        self.prev_activation = 0.0;
        self.predictors = [0.0; Predictor::COUNT];
        for s in self
            .input_synapses
            .iter_mut()
            .chain(self.hidden_synapses.iter_mut())
        {
            s.reset();
        }
    }
}

/// Log-compressed strength of an activation rise, in `[0, 1]`.
///
/// Zero unless the rise exceeds `threshold`; otherwise each doubling of the rise over
/// the threshold adds one level, capped at [`SPIKE_POWER_LEVELS`].
pub fn spike_power(rise: f64, threshold: f64) -> f64 {
    if !(rise > threshold) {
        return 0.0;
    }
    let level = (rise / threshold).log2().floor() as u32 + 1;
    f64::from(level.min(SPIKE_POWER_LEVELS)) / f64::from(SPIKE_POWER_LEVELS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_indices_are_dense_and_ordered() {
        for (i, p) in Predictor::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn spike_power_levels() {
        assert_eq!(spike_power(0.05, 0.1), 0.0);
        assert_eq!(spike_power(-1.0, 0.1), 0.0);
        assert_eq!(spike_power(0.15, 0.1), 1.0 / 8.0);
        assert_eq!(spike_power(0.25, 0.1), 2.0 / 8.0);
        assert_eq!(spike_power(0.45, 0.1), 3.0 / 8.0);
        assert_eq!(spike_power(1e6, 0.1), 1.0);
    }

    #[test]
    fn leaky_update_blends_previous_activation() {
        let mut n = ReservoirNeuron::new_hidden(0, Activation::Linear, 0.0, 0.25, 0.1, 0.5);
        n.recompute(1.0);
        assert!((n.activation() - 0.75).abs() < 1e-12);
        n.recompute(1.0);
        assert!((n.activation() - (0.25 * 0.75 + 0.75)).abs() < 1e-12);
        assert!((n.prev_activation() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn predictors_track_activation_and_spikes() {
        let mut n = ReservoirNeuron::new_hidden(0, Activation::Linear, 0.0, 0.0, 0.1, 0.5);
        n.recompute(-0.5);
        assert_eq!(n.predictor(Predictor::Activation), -0.5);
        assert_eq!(n.predictor(Predictor::SquaredActivation), -0.25);
        assert_eq!(n.predictor(Predictor::SpikesFadingTrace), 0.0);

        // Rise of 1.0 = 10x threshold -> level 4.
        n.recompute(0.5);
        assert!((n.predictor(Predictor::SpikesFadingTrace) - 0.5 * 0.5).abs() < 1e-12);
        n.recompute(0.5);
        assert!((n.predictor(Predictor::SpikesFadingTrace) - 0.125).abs() < 1e-12);

        n.reset();
        assert_eq!(n.activation(), 0.0);
        assert_eq!(n.predictor(Predictor::SpikesFadingTrace), 0.0);
        assert!(n.is_enabled(Predictor::SquaredActivation));
    }
}
