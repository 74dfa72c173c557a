//! Layer descriptors over the flat buffers.
//!
//! A layer owns no numbers. It records where its weights and biases live inside the
//! engine's flat weight buffer, and where its inputs and neurons live inside the flat
//! node buffers (activations / sums). Node buffers are laid out as
//! `[network inputs | layer 0 neurons | layer 1 neurons | ...]`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Activation;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    pub num_inputs: usize,
    pub num_neurons: usize,
    pub activation: Activation,
    /// Start of the row-major `(num_neurons, num_inputs)` weight block.
    pub weights_start: usize,
    /// Start of the `num_neurons` biases; directly follows the weight block.
    pub biases_start: usize,
    /// Flat node index of the first input of this layer.
    pub inputs_start: usize,
    /// Flat node index of the first neuron of this layer.
    pub neurons_start: usize,
    pub is_first: bool,
    pub is_output: bool,
}

impl Layer {
    /// Number of weights and biases of this layer.
    #[inline]
    pub fn num_params(&self) -> usize {
        self.num_inputs * self.num_neurons + self.num_neurons
    }

    /// One past the last flat weight index of this layer.
    #[inline]
    pub fn weights_end(&self) -> usize {
        self.weights_start + self.num_params()
    }

    /// Flat weight index of the weight from input `input` into neuron `neuron`.
    #[inline]
    pub fn weight_idx(&self, neuron: usize, input: usize) -> usize {
        self.weights_start + neuron * self.num_inputs + input
    }

    /// Forward pass of this layer.
    ///
    /// Reads its inputs from `activations`, writes sums and activations of its
    /// neurons.
    ///
    /// Shape contract: `activations` and `sums` are full flat node buffers of the
    /// owning engine; `weights` is the full flat weight buffer.
    #[inline]
    pub fn compute(&self, weights: &[f64], activations: &mut [f64], sums: &mut [f64]) {
        debug_assert!(self.inputs_start + self.num_inputs <= self.neurons_start);

        let (head, tail) = activations.split_at_mut(self.neurons_start);
        let inputs = &head[self.inputs_start..self.inputs_start + self.num_inputs];
        let outputs = &mut tail[..self.num_neurons];
        let layer_sums = &mut sums[self.neurons_start..self.neurons_start + self.num_neurons];

        for (n, sum_out) in layer_sums.iter_mut().enumerate() {
            let row = self.weights_start + n * self.num_inputs;
            let mut sum = weights[self.biases_start + n];
            for (&w, &x) in weights[row..row + self.num_inputs].iter().zip(inputs) {
                sum = w.mul_add(x, sum);
            }
            *sum_out = sum;
        }

        self.activation.compute_vec(layer_sums, outputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_writes_sums_and_activations_at_offsets() {
        // 2 inputs -> 2 ReLU neurons.
        let layer = Layer {
            num_inputs: 2,
            num_neurons: 2,
            activation: Activation::ReLU,
            weights_start: 0,
            biases_start: 4,
            inputs_start: 0,
            neurons_start: 2,
            is_first: true,
            is_output: true,
        };
        let weights = [1.0, 2.0, -1.0, -1.0, 0.5, 0.0];
        let mut acts = [1.0, 1.0, 0.0, 0.0];
        let mut sums = [0.0; 4];
        layer.compute(&weights, &mut acts, &mut sums);

        assert_eq!(&sums[2..], &[3.5, -2.0]);
        assert_eq!(&acts[2..], &[3.5, 0.0]);
        assert_eq!(layer.weight_idx(1, 0), 2);
        assert_eq!(layer.weights_end(), 6);
    }
}
