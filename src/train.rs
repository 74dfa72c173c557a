//! Mini-batch training of an [`MlpEngine`] over one or more attempts.
//!
//! Batches are split across the rayon pool. Each worker owns its scratch buffers and
//! only reads the engine; worker gradients are merged serially in chunk order, then
//! the single update step takes the weights mutably.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;

use crate::{
    BatchSize, Error, ErrorStat, Layer, MlpEngine, NetworkModelConfig, NormConstraint,
    OptimizerState, Regularization, Result, SampleDataset, TaskType,
};

/// Weight-vector magnitude above which training is considered to have diverged.
const MAX_WEIGHTS_MAGNITUDE: f64 = 1e10;

/// Trains one engine on one dataset, epoch by epoch, across restarts ("attempts").
#[derive(Debug)]
pub struct Trainer<'a> {
    cfg: NetworkModelConfig,
    data: &'a SampleDataset,
    engine: MlpEngine,
    optimizer: OptimizerState,
    rng: StdRng,
    /// Per layer: regularization and norm constraint of the layer's incoming weights.
    layer_params: Vec<(Regularization, NormConstraint)>,
    /// Per flat node: dropout keep probability (1.0 = never dropped).
    node_keep: Vec<f64>,
    uses_dropout: bool,
    batch_size: usize,
    order: Vec<usize>,
    class_weights: Option<Vec<f64>>,
    attempt: usize,
    attempt_epoch: usize,
    error_stat: ErrorStat,
    permeability: f64,
    last_gradient_norm: f64,
    workers: Vec<WorkerScratch>,
    gradients: Vec<f64>,
    active: Vec<bool>,
}

#[derive(Debug, Clone)]
struct WorkerScratch {
    activations: Vec<f64>,
    sums: Vec<f64>,
    /// `dL/dz` per flat node.
    node_grads: Vec<f64>,
    /// Per flat node: 0 when dropped, `1/keep` when kept.
    node_scale: Vec<f64>,
    /// OR over the worker's samples: node was kept at least once.
    node_kept: Vec<bool>,
    gradients: Vec<f64>,
    loss_sum: f64,
}

impl WorkerScratch {
    fn new(num_flat_nodes: usize, num_weights: usize) -> Self {
        Self {
            activations: vec![0.0; num_flat_nodes],
            sums: vec![0.0; num_flat_nodes],
            node_grads: vec![0.0; num_flat_nodes],
            node_scale: vec![1.0; num_flat_nodes],
            node_kept: vec![false; num_flat_nodes],
            gradients: vec![0.0; num_weights],
            loss_sum: 0.0,
        }
    }

    fn clear(&mut self) {
        self.node_kept.fill(false);
        self.gradients.fill(0.0);
        self.loss_sum = 0.0;
    }
}

impl<'a> Trainer<'a> {
    /// Create a trainer for a copy of `template` and start attempt 1.
    pub fn new(
        template: &MlpEngine,
        data: &'a SampleDataset,
        cfg: &NetworkModelConfig,
        seed: u64,
    ) -> Result<Self> {
        cfg.check()?;
        if data.is_empty() {
            return Err(Error::InvalidData(
                "train dataset must not be empty".to_owned(),
            ));
        }
        if data.input_dim() != template.num_inputs() {
            return Err(Error::InvalidData(format!(
                "train input_dim {} does not match engine num_inputs {}",
                data.input_dim(),
                template.num_inputs()
            )));
        }
        if data.output_dim() != template.num_outputs() {
            return Err(Error::InvalidData(format!(
                "train output_dim {} does not match engine num_outputs {}",
                data.output_dim(),
                template.num_outputs()
            )));
        }
        let layers = template.layers();
        if layers.len() != cfg.hidden_layers.len() + 1 {
            return Err(Error::InvalidShape(format!(
                "engine has {} hidden layers, config has {}",
                layers.len() - 1,
                cfg.hidden_layers.len()
            )));
        }
        for (i, (layer, hidden)) in layers.iter().zip(&cfg.hidden_layers).enumerate() {
            if layer.num_neurons != hidden.neurons || layer.activation != hidden.activation {
                return Err(Error::InvalidShape(format!(
                    "engine hidden layer {i} does not match config"
                )));
            }
        }

        let layer_params = cfg
            .hidden_layers
            .iter()
            .map(|l| (l.regularization, l.norm))
            .chain(std::iter::once((
                cfg.output.regularization,
                cfg.output.norm,
            )))
            .collect();

        let mut node_keep = vec![1.0; template.num_flat_nodes()];
        node_keep[..template.num_inputs()].fill(1.0 - cfg.input.dropout);
        for (layer, hidden) in layers.iter().zip(&cfg.hidden_layers) {
            node_keep[layer.neurons_start..layer.neurons_start + layer.num_neurons]
                .fill(1.0 - hidden.dropout);
        }

        let n = data.len();
        let batch_size = match cfg.batch_size {
            BatchSize::Full => n,
            BatchSize::Fixed(size) => size.min(n),
            BatchSize::Auto => auto_batch_size(cfg, n),
        };

        let class_weights = if cfg.class_balanced_loss && template.task() != TaskType::Regression
        {
            Some(compute_class_weights(template.task(), data))
        } else {
            None
        };

        let num_workers = rayon::current_num_threads().max(1);
        let workers = vec![
            WorkerScratch::new(template.num_flat_nodes(), template.num_weights());
            num_workers
        ];

        let mut trainer = Self {
            cfg: cfg.clone(),
            data,
            engine: template.clone(),
            optimizer: cfg.optimizer.state(template.num_weights())?,
            rng: StdRng::seed_from_u64(seed),
            layer_params,
            node_keep,
            uses_dropout: cfg.uses_dropout(),
            batch_size,
            order: (0..n).collect(),
            class_weights,
            attempt: 0,
            attempt_epoch: 0,
            error_stat: ErrorStat::new(template.task()),
            permeability: 1.0,
            last_gradient_norm: 0.0,
            workers,
            gradients: vec![0.0; template.num_weights()],
            active: vec![true; template.num_weights()],
        };
        trainer.next_attempt()?;
        Ok(trainer)
    }

    /// Restart training from fresh random weights.
    pub fn next_attempt(&mut self) -> Result<()> {
        if self.attempt >= self.cfg.max_attempts {
            return Err(Error::InvalidOperation(format!(
                "all {} attempts are exhausted",
                self.cfg.max_attempts
            )));
        }
        self.attempt += 1;
        self.attempt_epoch = 0;
        self.engine.randomize_weights(&mut self.rng);
        self.optimizer.reset();
        self.error_stat = ErrorStat::new(self.engine.task());
        self.permeability = 1.0;
        self.last_gradient_norm = 0.0;
        log::debug!(
            "attempt {}/{} started (batch size {}, {} weights)",
            self.attempt,
            self.cfg.max_attempts,
            self.batch_size,
            self.engine.num_weights()
        );
        Ok(())
    }

    /// Run one epoch.
    ///
    /// Moves on to the next attempt when the current one has used up its epochs.
    /// Returns `false` (and does nothing) once every attempt is finished.
    pub fn epoch(&mut self) -> Result<bool> {
        if self.attempt_epoch >= self.cfg.max_attempt_epochs {
            if self.attempt >= self.cfg.max_attempts {
                return Ok(false);
            }
            self.next_attempt()?;
        }

        self.attempt_epoch += 1;
        self.permeability = self
            .cfg
            .throttle_valve
            .map_or(1.0, |valve| valve.permeability(self.attempt_epoch));
        self.optimizer
            .new_epoch(self.attempt_epoch, self.cfg.max_attempt_epochs);

        let n = self.data.len();
        if self.batch_size < n {
            self.order.shuffle(&mut self.rng);
        }

        let order = std::mem::take(&mut self.order);
        let result = order
            .chunks(self.batch_size)
            .try_for_each(|batch| self.perform_batch(batch));
        self.order = order;
        result?;

        self.finalize_epoch()?;
        Ok(true)
    }

    /// One optimizer step over the samples at `indices`.
    pub(crate) fn perform_batch(&mut self, indices: &[usize]) -> Result<()> {
        debug_assert!(!indices.is_empty());

        let chunk = indices.len().div_ceil(self.workers.len()).max(1);
        let num_chunks = indices.len().div_ceil(chunk);
        let seeds: Vec<u64> = if self.uses_dropout {
            (0..num_chunks).map(|_| self.rng.next_u64()).collect()
        } else {
            vec![0; num_chunks]
        };

        let engine = &self.engine;
        let data = self.data;
        let node_keep = &self.node_keep;
        let class_weights = self.class_weights.as_deref();
        let uses_dropout = self.uses_dropout;
        self.workers[..num_chunks]
            .par_iter_mut()
            .zip(indices.par_chunks(chunk))
            .zip(seeds.par_iter())
            .for_each(|((worker, samples), &seed)| {
                worker.clear();
                let mut rng = StdRng::seed_from_u64(seed);
                for &idx in samples {
                    accumulate_sample(
                        engine,
                        data.input(idx),
                        data.output(idx),
                        node_keep,
                        uses_dropout,
                        class_weights,
                        &mut rng,
                        worker,
                    );
                }
            });

        // Ordered merge.
        self.gradients.fill(0.0);
        let mut loss_sum = 0.0;
        let workers = &self.workers[..num_chunks];
        for worker in workers {
            for (g, &w) in self.gradients.iter_mut().zip(&worker.gradients) {
                *g += w;
            }
            loss_sum += worker.loss_sum;
        }
        let batch_len = indices.len() as f64;
        for g in &mut self.gradients {
            *g /= batch_len;
        }
        let cost = loss_sum / batch_len;

        if uses_dropout {
            let mut node_kept = vec![false; self.engine.num_flat_nodes()];
            for worker in workers {
                for (any, &kept) in node_kept.iter_mut().zip(&worker.node_kept) {
                    *any |= kept;
                }
            }
            fill_active_mask(self.engine.layers(), &node_kept, &mut self.active);
        }

        let dataset_len = data.len() as f64;
        let weights = self.engine.weights();
        for (layer, (reg, _)) in self.engine.layers().iter().zip(&self.layer_params) {
            if reg.lasso == 0.0 && reg.ridge == 0.0 {
                continue;
            }
            let range = layer.weights_start..layer.biases_start;
            for (g, &w) in self.gradients[range.clone()].iter_mut().zip(&weights[range]) {
                *g += (reg.lasso * sign(w) + reg.ridge * w) / dataset_len;
            }
        }

        if self.cfg.clip_value > 0.0 {
            clip_gradients_by_value(&mut self.gradients, self.cfg.clip_value);
        }
        self.last_gradient_norm = if self.cfg.clip_norm > 0.0 {
            clip_gradients_by_norm(&mut self.gradients, self.cfg.clip_norm)
        } else {
            l2_norm(&self.gradients)
        };

        self.optimizer.update(
            self.permeability,
            cost,
            &self.active,
            &self.gradients,
            self.engine.weights_mut(),
        );

        let magnitude = l2_norm(self.engine.weights());
        if magnitude.is_nan() || magnitude > MAX_WEIGHTS_MAGNITUDE {
            return Err(Error::NumericalInstability {
                attempt: self.attempt,
                epoch: self.attempt_epoch,
                magnitude,
            });
        }

        self.apply_norm_constraints();
        Ok(())
    }

    fn apply_norm_constraints(&mut self) {
        let layers = self.engine.layers().to_vec();
        let weights = self.engine.weights_mut();
        for (layer, (_, norm)) in layers.iter().zip(&self.layer_params) {
            if !norm.is_enabled() {
                continue;
            }
            let (w, b) = weights[layer.weights_start..layer.weights_end()]
                .split_at_mut(layer.biases_start - layer.weights_start);
            w.par_chunks_mut(layer.num_inputs)
                .zip(b.par_iter_mut())
                .for_each(|(row, bias)| constrain_neuron(row, bias, norm));
        }
    }

    fn finalize_epoch(&mut self) -> Result<()> {
        self.engine.refresh_weight_stats();
        self.error_stat = self.engine.compute_dataset(self.data)?;
        log::debug!(
            "attempt {} epoch {}: loss {:.6}, rmse {:.6}, gradient norm {:.6}",
            self.attempt,
            self.attempt_epoch,
            self.error_stat.mean_loss(),
            self.error_stat.rmse(),
            self.last_gradient_norm
        );
        Ok(())
    }

    #[inline]
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    #[inline]
    pub fn attempt_epoch(&self) -> usize {
        self.attempt_epoch
    }

    #[inline]
    pub fn max_attempts(&self) -> usize {
        self.cfg.max_attempts
    }

    #[inline]
    pub fn max_attempt_epochs(&self) -> usize {
        self.cfg.max_attempt_epochs
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The engine being trained (current weights).
    #[inline]
    pub fn engine(&self) -> &MlpEngine {
        &self.engine
    }

    /// Statistics over the whole training set after the last epoch.
    #[inline]
    pub fn error_stat(&self) -> &ErrorStat {
        &self.error_stat
    }

    #[inline]
    pub fn learning_permeability(&self) -> f64 {
        self.permeability
    }

    /// Class-imbalance gradient coefficients.
    ///
    /// Binary: `[negative, positive]` pairs, one per output. Categorical: one weight per
    /// class. `None` when class balancing is off or the task is regression.
    #[inline]
    pub fn class_weights(&self) -> Option<&[f64]> {
        self.class_weights.as_deref()
    }

    /// L2 norm of the last applied gradient (after clipping).
    #[inline]
    pub fn last_gradient_norm(&self) -> f64 {
        self.last_gradient_norm
    }
}

fn auto_batch_size(cfg: &NetworkModelConfig, n: usize) -> usize {
    if cfg.optimizer.is_rprop() || n == 1 {
        n
    } else if cfg.optimizer.is_sgd() {
        1
    } else {
        (n / 10).clamp(32, 128).min(n)
    }
}

/// Forward with dropout, backward, and gradient accumulation for one sample.
#[allow(clippy::too_many_arguments)]
fn accumulate_sample(
    engine: &MlpEngine,
    input: &[f64],
    ideal: &[f64],
    node_keep: &[f64],
    uses_dropout: bool,
    class_weights: Option<&[f64]>,
    rng: &mut StdRng,
    w: &mut WorkerScratch,
) {
    let weights = engine.weights();
    let layers = engine.layers();
    let num_inputs = engine.num_inputs();

    w.activations[..num_inputs].copy_from_slice(input);
    if uses_dropout {
        apply_dropout(0..num_inputs, node_keep, rng, w);
    }
    for layer in layers {
        layer.compute(weights, &mut w.activations, &mut w.sums);
        if uses_dropout && !layer.is_output {
            let range = layer.neurons_start..layer.neurons_start + layer.num_neurons;
            apply_dropout(range, node_keep, rng, w);
        }
    }

    let out = engine.output_layer();
    let out_range = out.neurons_start..out.neurons_start + out.num_neurons;
    let computed = &w.activations[out_range.clone()];
    w.loss_sum += engine.loss().compute(computed, ideal);
    engine.loss().compute_z_gradient(
        out.activation,
        computed,
        ideal,
        &w.sums[out_range.clone()],
        &mut w.node_grads[out_range.clone()],
    );
    if uses_dropout {
        w.node_kept[out_range.clone()].fill(true);
    }

    if let Some(cw) = class_weights {
        let grads = &mut w.node_grads[out_range];
        match engine.task() {
            TaskType::Binary => {
                for (o, (g, &t)) in grads.iter_mut().zip(ideal).enumerate() {
                    *g *= cw[2 * o + usize::from(t >= 0.5)];
                }
            }
            TaskType::Categorical => {
                let coeff = cw[argmax(ideal)];
                for g in grads {
                    *g *= coeff;
                }
            }
            TaskType::Regression => {}
        }
    }

    for (l, layer) in layers.iter().enumerate().rev() {
        for n in 0..layer.num_neurons {
            let g = w.node_grads[layer.neurons_start + n];
            w.gradients[layer.biases_start + n] += g;
            if g == 0.0 {
                continue;
            }
            let row = layer.weight_idx(n, 0);
            let inputs = &w.activations[layer.inputs_start..layer.inputs_start + layer.num_inputs];
            for (acc, &x) in w.gradients[row..row + layer.num_inputs].iter_mut().zip(inputs) {
                *acc = g.mul_add(x, *acc);
            }
        }

        if l == 0 {
            break;
        }
        let prev = &layers[l - 1];
        for i in 0..prev.num_neurons {
            let node = prev.neurons_start + i;
            let scale = w.node_scale[node];
            if uses_dropout && scale == 0.0 {
                w.node_grads[node] = 0.0;
                continue;
            }
            let mut sum = 0.0;
            for n in 0..layer.num_neurons {
                sum = weights[layer.weight_idx(n, i)]
                    .mul_add(w.node_grads[layer.neurons_start + n], sum);
            }
            let z = w.sums[node];
            let derivative = prev.activation.derivative(z, prev.activation.compute(z));
            w.node_grads[node] = if uses_dropout {
                sum * derivative * scale
            } else {
                sum * derivative
            };
        }
    }
}

/// Inverted dropout over a range of flat nodes.
fn apply_dropout(
    range: std::ops::Range<usize>,
    node_keep: &[f64],
    rng: &mut StdRng,
    w: &mut WorkerScratch,
) {
    for node in range {
        let keep = node_keep[node];
        let scale = if keep >= 1.0 {
            1.0
        } else if rng.r#gen::<f64>() < keep {
            1.0 / keep
        } else {
            0.0
        };
        w.node_scale[node] = scale;
        w.activations[node] *= scale;
        if scale > 0.0 {
            w.node_kept[node] = true;
        }
    }
}

/// A weight is active when both its source node and its neuron were kept for at least
/// one sample of the batch. Biases follow their neuron.
fn fill_active_mask(layers: &[Layer], node_kept: &[bool], active: &mut [bool]) {
    for layer in layers {
        for n in 0..layer.num_neurons {
            let neuron_kept = node_kept[layer.neurons_start + n];
            active[layer.biases_start + n] = neuron_kept;
            for i in 0..layer.num_inputs {
                active[layer.weight_idx(n, i)] = neuron_kept && node_kept[layer.inputs_start + i];
            }
        }
    }
}

fn constrain_neuron(row: &mut [f64], bias: &mut f64, norm: &NormConstraint) {
    let mut sq: f64 = row.iter().map(|w| w * w).sum();
    if norm.include_bias {
        sq += *bias * *bias;
    }
    let current = sq.sqrt();
    let scale = if current > norm.max_norm {
        norm.max_norm / current
    } else if current < norm.min_norm && current > 0.0 {
        norm.min_norm / current
    } else {
        return;
    };
    for w in row {
        *w *= scale;
    }
    if norm.include_bias {
        *bias *= scale;
    }
}

/// Cap every gradient to `[-max_abs, max_abs]`.
pub fn clip_gradients_by_value(gradients: &mut [f64], max_abs: f64) {
    for g in gradients {
        *g = g.clamp(-max_abs, max_abs);
    }
}

/// Scale `gradients` uniformly so their L2 norm is at most `max_norm`.
///
/// Returns the norm after clipping.
pub fn clip_gradients_by_norm(gradients: &mut [f64], max_norm: f64) -> f64 {
    let norm = l2_norm(gradients);
    if norm > max_norm {
        let scale = max_norm / norm;
        for g in gradients.iter_mut() {
            *g *= scale;
        }
        return max_norm;
    }
    norm
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

#[inline]
fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
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

/// Inverse effective-number class weights, normalized so that the weights of the
/// classes present average 1.
fn compute_class_weights(task: TaskType, data: &SampleDataset) -> Vec<f64> {
    let n = data.len();
    let beta = (n as f64 - 1.0) / n as f64;
    let effective = |count: usize| {
        if beta == 0.0 {
            1.0
        } else {
            (1.0 - beta.powi(count as i32)) / (1.0 - beta)
        }
    };
    let normalize = |counts: &[usize]| -> Vec<f64> {
        let raw: Vec<f64> = counts
            .iter()
            .map(|&c| if c == 0 { 0.0 } else { 1.0 / effective(c) })
            .collect();
        let present = counts.iter().filter(|&&c| c > 0).count() as f64;
        let total: f64 = raw.iter().sum();
        raw.iter().map(|w| w * present / total).collect()
    };

    let outputs = data.output_dim();
    match task {
        TaskType::Binary => {
            let mut weights = Vec::with_capacity(2 * outputs);
            for o in 0..outputs {
                let positives = (0..n).filter(|&i| data.output(i)[o] >= 0.5).count();
                weights.extend(normalize(&[n - positives, positives]));
            }
            weights
        }
        TaskType::Categorical => {
            let mut counts = vec![0; outputs];
            for i in 0..n {
                counts[argmax(data.output(i))] += 1;
            }
            normalize(&counts)
        }
        TaskType::Regression => Vec::new(),
    }
}
