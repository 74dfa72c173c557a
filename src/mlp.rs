use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::{
    Error, ErrorStat, Layer, Loss, NetworkModelConfig, Result, SampleDataset, TaskType,
};

/// Dense feed-forward network over a single flat weight buffer.
///
/// Per layer the buffer holds the row-major `(neurons, inputs)` weight block followed by
/// the layer's biases. Layers are packed back to back with no gaps.
#[derive(Debug, Clone)]
pub struct MlpEngine {
    task: TaskType,
    num_inputs: usize,
    output_feature_names: Vec<String>,
    layers: Vec<Layer>,
    weights: Vec<f64>,
    loss: Loss,
    num_flat_nodes: usize,
    weight_stats: WeightStats,
}

/// Aggregate statistics of the (non-bias) weights, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightStats {
    pub hidden_rms: f64,
    pub hidden_stddev: f64,
    pub output_rms: f64,
    pub output_stddev: f64,
}

impl MlpEngine {
    /// Build the topology for `task`.
    ///
    /// Hidden layers come from `cfg`; the output layer has one neuron per output feature
    /// and the activation implied by the task.
    pub fn new(
        task: TaskType,
        num_inputs: usize,
        output_feature_names: Vec<String>,
        cfg: &NetworkModelConfig,
    ) -> Result<Self> {
        cfg.check()?;
        let hidden: Vec<_> = cfg
            .hidden_layers
            .iter()
            .map(|l| (l.neurons, l.activation))
            .collect();
        Self::from_topology(task, num_inputs, output_feature_names, &hidden)
    }

    pub(crate) fn from_topology(
        task: TaskType,
        num_inputs: usize,
        output_feature_names: Vec<String>,
        hidden: &[(usize, crate::Activation)],
    ) -> Result<Self> {
        if num_inputs == 0 {
            return Err(Error::InvalidShape("num_inputs must be > 0".to_owned()));
        }
        if output_feature_names.is_empty() {
            return Err(Error::InvalidShape(
                "at least one output feature is required".to_owned(),
            ));
        }
        if task == TaskType::Categorical && output_feature_names.len() < 2 {
            return Err(Error::InvalidShape(format!(
                "categorical task needs >= 2 output features, got {}",
                output_feature_names.len()
            )));
        }
        for (i, name) in output_feature_names.iter().enumerate() {
            if output_feature_names[..i].contains(name) {
                return Err(Error::InvalidShape(format!(
                    "duplicate output feature name {name:?}"
                )));
            }
        }

        let (output_activation, loss) = Loss::for_task(task);
        let num_outputs = output_feature_names.len();

        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut weights_start = 0;
        let mut inputs_start = 0;
        let mut neurons_start = num_inputs;
        let mut layer_inputs = num_inputs;

        let specs = hidden
            .iter()
            .copied()
            .chain(std::iter::once((num_outputs, output_activation)));
        let num_layers = hidden.len() + 1;
        for (idx, (neurons, activation)) in specs.enumerate() {
            if neurons == 0 {
                return Err(Error::InvalidShape(format!(
                    "layer {idx} must have > 0 neurons"
                )));
            }
            activation.validate()?;

            let layer = Layer {
                num_inputs: layer_inputs,
                num_neurons: neurons,
                activation,
                weights_start,
                biases_start: weights_start + layer_inputs * neurons,
                inputs_start,
                neurons_start,
                is_first: idx == 0,
                is_output: idx + 1 == num_layers,
            };
            weights_start = layer.weights_end();
            inputs_start = neurons_start;
            neurons_start += neurons;
            layer_inputs = neurons;
            layers.push(layer);
        }

        let mut engine = Self {
            task,
            num_inputs,
            output_feature_names,
            layers,
            weights: vec![0.0; weights_start],
            loss,
            num_flat_nodes: neurons_start,
            weight_stats: WeightStats::default(),
        };
        engine.refresh_weight_stats();
        Ok(engine)
    }

    #[inline]
    pub fn task(&self) -> TaskType {
        self.task
    }

    #[inline]
    pub fn loss(&self) -> Loss {
        self.loss
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.output_feature_names.len()
    }

    #[inline]
    pub fn output_feature_names(&self) -> &[String] {
        &self.output_feature_names
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn output_layer(&self) -> &Layer {
        self.layers
            .last()
            .expect("engine must have an output layer")
    }

    #[inline]
    pub fn num_weights(&self) -> usize {
        self.weights.len()
    }

    /// Length of the flat activation / sum buffers used by [`MlpEngine::compute_into`].
    #[inline]
    pub fn num_flat_nodes(&self) -> usize {
        self.num_flat_nodes
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub(crate) fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    #[inline]
    pub fn weight_stats(&self) -> WeightStats {
        self.weight_stats
    }

    /// Draw fresh weights.
    ///
    /// Weights are normal with an activation-specific standard deviation. Biases are
    /// zero, except a Softmax output layer starts at `-ln(neurons - 1)`.
    pub fn randomize_weights<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for layer in &self.layers {
            let std = layer
                .activation
                .weight_init_std(layer.num_inputs, layer.num_neurons);
            debug_assert!(std.is_finite() && std > 0.0, "init std {std}");
            let block = &mut self.weights[layer.weights_start..layer.biases_start];
            match Normal::new(0.0, std) {
                Ok(normal) => block.iter_mut().for_each(|w| *w = normal.sample(rng)),
                Err(e) => {
                    log::warn!("weight init std {std} rejected ({e}); zeroing layer weights");
                    block.fill(0.0);
                }
            }

            let bias = if layer.is_output
                && layer.activation == crate::Activation::Softmax
                && layer.num_neurons > 1
            {
                -((layer.num_neurons - 1) as f64).ln()
            } else {
                0.0
            };
            self.weights[layer.biases_start..layer.weights_end()].fill(bias);
        }
        self.refresh_weight_stats();
    }

    /// Compute the network output for one input vector.
    pub fn compute(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.num_inputs {
            return Err(Error::InvalidShape(format!(
                "input len {} does not match engine num_inputs {}",
                input.len(),
                self.num_inputs
            )));
        }

        let mut activations = vec![0.0; self.num_flat_nodes];
        let mut sums = vec![0.0; self.num_flat_nodes];
        let start = self.compute_into(input, &mut activations, &mut sums);
        Ok(activations[start..start + self.num_outputs()].to_vec())
    }

    /// Forward pass into caller-provided flat buffers.
    ///
    /// Returns the index of the first output within `flat_activations`.
    ///
    /// Shape contract:
    /// - `input.len() == self.num_inputs()`
    /// - `flat_activations.len() == flat_sums.len() == self.num_flat_nodes()`
    pub fn compute_into(
        &self,
        input: &[f64],
        flat_activations: &mut [f64],
        flat_sums: &mut [f64],
    ) -> usize {
        assert_eq!(
            input.len(),
            self.num_inputs,
            "input len {} does not match engine num_inputs {}",
            input.len(),
            self.num_inputs
        );
        assert_eq!(
            flat_activations.len(),
            self.num_flat_nodes,
            "activation buffer len {} does not match engine flat nodes {}",
            flat_activations.len(),
            self.num_flat_nodes
        );
        assert_eq!(
            flat_sums.len(),
            self.num_flat_nodes,
            "sum buffer len {} does not match engine flat nodes {}",
            flat_sums.len(),
            self.num_flat_nodes
        );

        flat_activations[..self.num_inputs].copy_from_slice(input);
        for layer in &self.layers {
            layer.compute(&self.weights, flat_activations, flat_sums);
        }
        self.output_layer().neurons_start
    }

    /// Copy of the flat weight buffer.
    pub fn weights_copy(&self) -> Vec<f64> {
        self.weights.clone()
    }

    /// Replace the whole flat weight buffer.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.weights.len() {
            return Err(Error::InvalidShape(format!(
                "weights len {} does not match engine weight count {}",
                weights.len(),
                self.weights.len()
            )));
        }
        self.weights.copy_from_slice(weights);
        self.refresh_weight_stats();
        Ok(())
    }

    pub(crate) fn refresh_weight_stats(&mut self) {
        let mut hidden = MomentAcc::default();
        let mut output = MomentAcc::default();
        for layer in &self.layers {
            let acc = if layer.is_output {
                &mut output
            } else {
                &mut hidden
            };
            for &w in &self.weights[layer.weights_start..layer.biases_start] {
                acc.add(w);
            }
        }
        self.weight_stats = WeightStats {
            hidden_rms: hidden.rms(),
            hidden_stddev: hidden.stddev(),
            output_rms: output.rms(),
            output_stddev: output.stddev(),
        };
    }

    /// Error statistics of the engine over a whole dataset (computed in parallel).
    pub fn compute_dataset(&self, data: &SampleDataset) -> Result<ErrorStat> {
        if data.input_dim() != self.num_inputs {
            return Err(Error::InvalidData(format!(
                "dataset input_dim {} does not match engine num_inputs {}",
                data.input_dim(),
                self.num_inputs
            )));
        }
        if data.output_dim() != self.num_outputs() {
            return Err(Error::InvalidData(format!(
                "dataset output_dim {} does not match engine num_outputs {}",
                data.output_dim(),
                self.num_outputs()
            )));
        }

        let n = data.len();
        let chunk = chunk_len(n);
        let partials: Vec<ErrorStat> = (0..n.div_ceil(chunk))
            .into_par_iter()
            .map(|c| {
                let mut stat = ErrorStat::new(self.task);
                let mut activations = vec![0.0; self.num_flat_nodes];
                let mut sums = vec![0.0; self.num_flat_nodes];
                for idx in c * chunk..((c + 1) * chunk).min(n) {
                    let start = self.compute_into(data.input(idx), &mut activations, &mut sums);
                    let computed = &activations[start..start + self.num_outputs()];
                    stat.add_sample(self.loss, computed, data.output(idx));
                }
                stat
            })
            .collect();

        let mut total = ErrorStat::new(self.task);
        for partial in &partials {
            total.merge(partial);
        }
        Ok(total)
    }
}

/// Items per worker when `total` items are split across the rayon pool.
#[inline]
pub(crate) fn chunk_len(total: usize) -> usize {
    total
        .div_ceil(rayon::current_num_threads().max(1))
        .max(1)
}

#[derive(Debug, Default)]
struct MomentAcc {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl MomentAcc {
    fn add(&mut self, x: f64) {
        self.n += 1;
        self.sum += x;
        self.sum_sq += x * x;
    }

    fn rms(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        (self.sum_sq / self.n as f64).sqrt()
    }

    fn stddev(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let mean = self.sum / self.n as f64;
        (self.sum_sq / self.n as f64 - mean * mean).max(0.0).sqrt()
    }
}
