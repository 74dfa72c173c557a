//! Recurrent reservoir turning time series into fixed-size predictor vectors.
//!
//! Hidden neurons are sparsely and randomly connected through delay-line synapses. The
//! hidden weight matrix is rescaled to a configured spectral radius so the reservoir
//! keeps a fading memory of its input. Every hidden neuron exposes up to three
//! predictors (see [`Predictor`]); the reservoir output concatenates them in sections,
//! one section per predictor kind, in [`Predictor::ALL`] order.
//!
//! Pattern feeding runs each pattern twice (reversed, then forward, with a state
//! reset in between). Within a section the reverse-pass values come first.

mod config;
mod neuron;
mod synapse;

pub use config::{
    InputFeeding, PredictorsConfig, ReservoirConfig, ReservoirHiddenConfig, ReservoirInputConfig,
};
pub use neuron::{Predictor, ReservoirNeuron, spike_power};
pub use synapse::{Synapse, SynapseSource};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::{Error, Result};

const BIAS_RANGE: f64 = 0.1;

const POWER_ITERATION_TOLERANCE: f64 = 1e-6;
const POWER_ITERATION_MAX_STEPS: usize = 1000;

/// Predictors whose span or standard deviation over the initialization batch falls
/// below this are switched off.
const DEGENERATE_PREDICTOR_THRESHOLD: f64 = 1e-6;

const PARALLEL_STIMULI_MIN_SYNAPSES: usize = 7000;
const PARALLEL_STIMULI_MIN_NEURONS: usize = 500;
const PARALLEL_RECOMPUTE_MIN_NEURONS: usize = 1000;

type PassPredictors = Vec<[f64; Predictor::COUNT]>;

#[derive(Debug, Clone)]
pub struct Reservoir {
    cfg: ReservoirConfig,
    input_neurons: Vec<ReservoirNeuron>,
    hidden_neurons: Vec<ReservoirNeuron>,
    input_acts: Vec<f64>,
    hidden_acts: Vec<f64>,
    num_synapses: usize,
    booting_countdown: usize,
    initialized: bool,
    initial_eigenvalue: f64,
}

impl Reservoir {
    /// Build a reservoir. Construction is fully determined by `cfg` and `seed`.
    pub fn new(cfg: ReservoirConfig, seed: u64) -> Result<Self> {
        cfg.check()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let hidden_cfg = &cfg.hidden;
        let n = hidden_cfg.num_neurons;

        let input_neurons: Vec<_> = (0..cfg.input.num_variables)
            .map(ReservoirNeuron::new_input)
            .collect();
        let mut hidden: Vec<_> = (0..n)
            .map(|i| {
                let mut neuron = ReservoirNeuron::new_hidden(
                    i,
                    hidden_cfg.activation,
                    rng.gen_range(-BIAS_RANGE..=BIAS_RANGE),
                    hidden_cfg.retainment,
                    hidden_cfg.spike_threshold,
                    hidden_cfg.spikes_fading,
                );
                for p in Predictor::ALL {
                    neuron.set_enabled(p, predictor_configured(&cfg.predictors, p));
                }
                neuron
            })
            .collect();

        connect_hidden(&mut hidden, hidden_cfg.density, hidden_cfg.max_delay, &mut rng);
        homogenize_excitability(&mut hidden);

        let initial_eigenvalue = power_iteration(&hidden);
        if initial_eigenvalue > 0.0 {
            let scale = hidden_cfg.spectral_radius / initial_eigenvalue;
            for s in hidden.iter_mut().flat_map(|n| n.hidden_synapses.iter_mut()) {
                s.weight *= scale;
            }
        } else {
            log::warn!("reservoir hidden weights have a zero dominant eigenvalue");
        }

        connect_inputs(&mut hidden, &cfg, &mut rng);

        let (lo, hi) = hidden_cfg.activation.output_range();
        if hidden_cfg.spike_threshold >= hi - lo {
            log::warn!(
                "spike threshold {} is not below the {:?} output span; spike traces stay silent",
                hidden_cfg.spike_threshold,
                hidden_cfg.activation
            );
        }

        let num_synapses = hidden
            .iter()
            .map(|n| n.input_synapses.len() + n.hidden_synapses.len())
            .sum();
        log::debug!(
            "reservoir built: {} hidden neurons, {} synapses, eigenvalue {:.6} rescaled to {}",
            n,
            num_synapses,
            initial_eigenvalue,
            hidden_cfg.spectral_radius
        );

        let mut reservoir = Self {
            input_acts: vec![0.0; cfg.input.num_variables],
            hidden_acts: vec![0.0; n],
            cfg,
            input_neurons,
            hidden_neurons: hidden,
            num_synapses,
            booting_countdown: 0,
            initialized: false,
            initial_eigenvalue,
        };
        reservoir.reset();
        Ok(reservoir)
    }

    #[inline]
    pub fn config(&self) -> &ReservoirConfig {
        &self.cfg
    }

    #[inline]
    pub fn input_neurons(&self) -> &[ReservoirNeuron] {
        &self.input_neurons
    }

    #[inline]
    pub fn hidden_neurons(&self) -> &[ReservoirNeuron] {
        &self.hidden_neurons
    }

    #[inline]
    pub fn num_synapses(&self) -> usize {
        self.num_synapses
    }

    /// Dominant eigenvalue estimate of the hidden weights before rescaling.
    #[inline]
    pub fn initial_eigenvalue(&self) -> f64 {
        self.initial_eigenvalue
    }

    /// Power-iteration estimate of the current hidden weights' dominant eigenvalue.
    pub fn estimate_spectral_radius(&self) -> f64 {
        power_iteration(&self.hidden_neurons)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialized, and (for time-point feeding) past the booting phase.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.initialized && self.booting_countdown == 0
    }

    /// Time points still needed before time-point output is valid.
    #[inline]
    pub fn booting_countdown(&self) -> usize {
        self.booting_countdown
    }

    /// Number of enabled (neuron, predictor) pairs.
    pub fn num_enabled_predictors(&self) -> usize {
        self.hidden_neurons
            .iter()
            .map(|n| Predictor::ALL.iter().filter(|&&p| n.is_enabled(p)).count())
            .sum()
    }

    /// Output length of the section of predictor kind `p`.
    pub fn section_len(&self, p: Predictor) -> usize {
        let enabled = self
            .hidden_neurons
            .iter()
            .filter(|n| n.is_enabled(p))
            .count();
        enabled * self.num_passes()
    }

    pub fn output_len(&self) -> usize {
        Predictor::ALL.iter().map(|&p| self.section_len(p)).sum()
    }

    /// Clear neuron and synapse state and restart the booting phase. Switches stay.
    pub fn reset(&mut self) {
        for neuron in self
            .input_neurons
            .iter_mut()
            .chain(self.hidden_neurons.iter_mut())
        {
            neuron.reset();
        }
        self.booting_countdown = if self.cfg.input.feeding.is_pattern() {
            0
        } else {
            self.cfg.hidden.num_neurons
        };
    }

    /// Run the initialization batch and switch off degenerate predictors.
    ///
    /// Time-point feeding treats `batch` as a stream of time points and returns one
    /// output per point after booting; pattern feeding returns one output per pattern.
    /// Calling it again on the same data disables the same predictors.
    ///
    /// The whole batch is validated first: on error the reservoir is left untouched.
    pub fn init(&mut self, batch: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.check_init_batch(batch)?;

        for neuron in &mut self.hidden_neurons {
            for p in Predictor::ALL {
                neuron.set_enabled(p, predictor_configured(&self.cfg.predictors, p));
            }
        }
        self.reset();

        let mut rows = Vec::with_capacity(batch.len());
        if self.cfg.input.feeding.is_pattern() {
            for pattern in batch {
                let passes = self.run_pattern(pattern);
                rows.push(self.assemble(&passes, false));
            }
        } else {
            for point in batch {
                self.step(point);
                if self.advance_booting() {
                    let pass = self.snapshot_predictors();
                    rows.push(self.assemble(std::slice::from_ref(&pass), false));
                }
            }
        }
        debug_assert!(!rows.is_empty());

        let columns = self.column_layout();
        for (col, &(neuron, p)) in columns.iter().enumerate() {
            if is_degenerate(rows.iter().map(|r| r[col])) {
                self.hidden_neurons[neuron].set_enabled(p, false);
            }
        }
        let keep: Vec<bool> = columns
            .iter()
            .map(|&(neuron, p)| self.hidden_neurons[neuron].is_enabled(p))
            .collect();
        let pruned = columns.len() / self.num_passes() - self.num_enabled_predictors();
        log::debug!(
            "reservoir initialized on {} samples: {} predictors enabled, {} pruned",
            batch.len(),
            self.num_enabled_predictors(),
            pruned
        );

        self.initialized = true;
        Ok(rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&keep)
                    .filter_map(|(v, &k)| k.then_some(v))
                    .collect()
            })
            .collect())
    }

    /// Feed one time point (time-point feeding only).
    ///
    /// Returns the output once booting is over, `None` before.
    pub fn push_time_point(&mut self, values: &[f64]) -> Result<Option<Vec<f64>>> {
        self.check_operational(false)?;
        self.check_time_point(values)?;
        self.step(values);
        if self.advance_booting() {
            let pass = self.snapshot_predictors();
            Ok(Some(self.assemble(std::slice::from_ref(&pass), true)))
        } else {
            Ok(None)
        }
    }

    /// Compute the output for one whole pattern (pattern feeding only).
    ///
    /// `pattern` is time-major with the variables of each time point interleaved.
    pub fn compute_pattern(&mut self, pattern: &[f64]) -> Result<Vec<f64>> {
        self.check_operational(true)?;
        self.check_pattern(pattern)?;
        let passes = self.run_pattern(pattern);
        Ok(self.assemble(&passes, true))
    }

    fn check_init_batch(&self, batch: &[Vec<f64>]) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::InvalidData(
                "reservoir initialization batch must not be empty".to_owned(),
            ));
        }
        if self.cfg.input.feeding.is_pattern() {
            return batch.iter().try_for_each(|pattern| self.check_pattern(pattern));
        }
        batch.iter().try_for_each(|point| self.check_time_point(point))?;
        let booting = self.cfg.hidden.num_neurons;
        if batch.len() < booting {
            return Err(Error::InvalidData(format!(
                "initialization stream of {} time points does not outlast booting ({booting} points)",
                batch.len()
            )));
        }
        Ok(())
    }

    fn check_operational(&self, pattern: bool) -> Result<()> {
        if !self.initialized {
            return Err(Error::InvalidOperation(
                "reservoir must be initialized before computing".to_owned(),
            ));
        }
        if self.cfg.input.feeding.is_pattern() != pattern {
            return Err(Error::InvalidOperation(format!(
                "reservoir is configured for {:?} feeding",
                self.cfg.input.feeding
            )));
        }
        Ok(())
    }

    fn check_time_point(&self, values: &[f64]) -> Result<()> {
        let vars = self.cfg.input.num_variables;
        if values.len() != vars {
            return Err(Error::InvalidData(format!(
                "time point has {} values, expected {vars}",
                values.len()
            )));
        }
        check_finite(values)
    }

    fn check_pattern(&self, pattern: &[f64]) -> Result<()> {
        let input = &self.cfg.input;
        let ok = match input.feeding {
            InputFeeding::PatternConstLength => pattern.len() == input.data_length,
            InputFeeding::PatternVarLength => {
                !pattern.is_empty()
                    && pattern.len() % input.num_variables == 0
                    && pattern.len() <= input.data_length
            }
            InputFeeding::TimePoint => false,
        };
        if !ok {
            return Err(Error::InvalidData(format!(
                "pattern length {} is not valid for {:?} feeding of {} variables (data_length {})",
                pattern.len(),
                input.feeding,
                input.num_variables,
                input.data_length
            )));
        }
        check_finite(pattern)
    }

    #[inline]
    fn num_passes(&self) -> usize {
        if self.cfg.input.feeding.is_pattern() {
            2
        } else {
            1
        }
    }

    /// Returns true when this step's output is valid.
    fn advance_booting(&mut self) -> bool {
        self.booting_countdown = self.booting_countdown.saturating_sub(1);
        self.booting_countdown == 0
    }

    /// Reverse pass, reset, forward pass.
    fn run_pattern(&mut self, pattern: &[f64]) -> [PassPredictors; 2] {
        let vars = self.cfg.input.num_variables;

        self.reset();
        for point in pattern.chunks(vars).rev() {
            self.step(point);
        }
        let reverse = self.snapshot_predictors();

        self.reset();
        for point in pattern.chunks(vars) {
            self.step(point);
        }
        let forward = self.snapshot_predictors();

        [reverse, forward]
    }

    /// Advance the whole reservoir by one time step.
    fn step(&mut self, values: &[f64]) {
        for ((neuron, act), &v) in self
            .input_neurons
            .iter_mut()
            .zip(&mut self.input_acts)
            .zip(values)
        {
            neuron.recompute(v);
            *act = neuron.activation();
        }
        for (act, neuron) in self.hidden_acts.iter_mut().zip(&self.hidden_neurons) {
            *act = neuron.activation();
        }

        let inputs = &self.input_acts;
        let hidden = &self.hidden_acts;
        let n = self.hidden_neurons.len();
        if self.num_synapses > PARALLEL_STIMULI_MIN_SYNAPSES || n > PARALLEL_STIMULI_MIN_NEURONS {
            self.hidden_neurons
                .par_iter_mut()
                .for_each(|neuron| neuron.collect_stimuli(inputs, hidden));
        } else {
            for neuron in &mut self.hidden_neurons {
                neuron.collect_stimuli(inputs, hidden);
            }
        }

        if n > PARALLEL_RECOMPUTE_MIN_NEURONS {
            self.hidden_neurons.par_iter_mut().for_each(|neuron| {
                let stimuli = neuron.stimuli;
                neuron.recompute(stimuli);
            });
        } else {
            for neuron in &mut self.hidden_neurons {
                let stimuli = neuron.stimuli;
                neuron.recompute(stimuli);
            }
        }
    }

    fn snapshot_predictors(&self) -> PassPredictors {
        self.hidden_neurons
            .iter()
            .map(|n| *n.predictors())
            .collect()
    }

    /// `(neuron, predictor)` of every column of an unfiltered output.
    fn column_layout(&self) -> Vec<(usize, Predictor)> {
        let mut columns = Vec::new();
        for p in Predictor::ALL {
            if !predictor_configured(&self.cfg.predictors, p) {
                continue;
            }
            for _ in 0..self.num_passes() {
                columns.extend((0..self.hidden_neurons.len()).map(|i| (i, p)));
            }
        }
        columns
    }

    /// Lay passes out section by section. `filtered` drops switched-off predictors.
    fn assemble(&self, passes: &[PassPredictors], filtered: bool) -> Vec<f64> {
        let mut out = Vec::with_capacity(if filtered {
            self.output_len()
        } else {
            passes.len() * self.hidden_neurons.len() * Predictor::COUNT
        });
        for p in Predictor::ALL {
            if !predictor_configured(&self.cfg.predictors, p) {
                continue;
            }
            for pass in passes {
                for (neuron, values) in self.hidden_neurons.iter().zip(pass) {
                    if !filtered || neuron.is_enabled(p) {
                        out.push(values[p.index()]);
                    }
                }
            }
        }
        out
    }
}

#[inline]
fn predictor_configured(cfg: &PredictorsConfig, p: Predictor) -> bool {
    match p {
        Predictor::Activation => cfg.activation,
        Predictor::SquaredActivation => cfg.squared_activation,
        Predictor::SpikesFadingTrace => cfg.spikes_fading_trace,
    }
}

fn check_finite(values: &[f64]) -> Result<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidData(
            "reservoir input must contain only finite values".to_owned(),
        ));
    }
    Ok(())
}

/// Ring-shuffle connectivity: each round shuffles the neurons into a ring and gives
/// every neuron one incoming synapse from its ring predecessor. Delays cycle through
/// `0..=max_delay`.
fn connect_hidden(hidden: &mut [ReservoirNeuron], density: f64, max_delay: usize, rng: &mut StdRng) {
    let n = hidden.len();
    let rounds = ((density * n as f64).round() as usize).max(1);
    let mut ring: Vec<usize> = (0..n).collect();
    let mut delay = 0;
    for _ in 0..rounds {
        ring.shuffle(rng);
        for i in 0..n {
            let source = ring[i];
            let target = ring[(i + 1) % n];
            let weight = rng.gen_range(-1.0..=1.0);
            hidden[target]
                .hidden_synapses
                .push(Synapse::new(SynapseSource::Hidden(source), weight, delay));
            delay = if delay >= max_delay { 0 } else { delay + 1 };
        }
    }
}

/// Scale each neuron's incoming hidden weights to unit absolute sum.
fn homogenize_excitability(hidden: &mut [ReservoirNeuron]) {
    for neuron in hidden {
        let sum: f64 = neuron.hidden_synapses.iter().map(|s| s.weight.abs()).sum();
        if sum > 0.0 {
            for s in &mut neuron.hidden_synapses {
                s.weight /= sum;
            }
        }
    }
}

/// Every hidden neuron listens to `round(density * num_variables)` (at least one)
/// distinct input variables, with random sign and strength in
/// `[max_strength / 2, max_strength]`, divided by its input in-degree.
fn connect_inputs(hidden: &mut [ReservoirNeuron], cfg: &ReservoirConfig, rng: &mut StdRng) {
    let input = &cfg.input;
    let vars = input.num_variables;
    let per_neuron = ((input.density * vars as f64).round() as usize).clamp(1, vars);
    let mut variables: Vec<usize> = (0..vars).collect();
    for neuron in hidden {
        variables.shuffle(rng);
        for &v in &variables[..per_neuron] {
            let magnitude = rng.gen_range(input.max_strength / 2.0..=input.max_strength);
            let weight = if rng.gen_bool(0.5) { magnitude } else { -magnitude };
            let delay = rng.gen_range(0..=input.max_delay);
            neuron
                .input_synapses
                .push(Synapse::new(SynapseSource::Input(v), weight, delay));
        }
        let in_degree = neuron.input_synapses.len() as f64;
        for s in &mut neuron.input_synapses {
            s.weight /= in_degree;
        }
    }
}

/// Power iteration `v <- W v / ||W v||_inf` over the hidden synapses (delays ignored).
///
/// Stops when the norm changes by less than the relative tolerance. If it never
/// settles (complex dominant pair), the geometric mean of the norms over the second
/// half of the run is returned instead.
fn power_iteration(hidden: &[ReservoirNeuron]) -> f64 {
    let n = hidden.len();
    let mut v = vec![1.0; n];
    let mut wv = vec![0.0; n];
    let mut lambda = 0.0_f64;
    let mut log_sum = 0.0;
    let mut log_count = 0usize;

    for step in 0..POWER_ITERATION_MAX_STEPS {
        for (out, neuron) in wv.iter_mut().zip(hidden) {
            *out = neuron
                .hidden_synapses
                .iter()
                .map(|s| match s.source {
                    SynapseSource::Hidden(i) => s.weight * v[i],
                    SynapseSource::Input(_) => 0.0,
                })
                .sum();
        }
        let norm = wv.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        if norm == 0.0 {
            return 0.0;
        }
        for (vi, &x) in v.iter_mut().zip(&wv) {
            *vi = x / norm;
        }

        if step >= POWER_ITERATION_MAX_STEPS / 2 {
            log_sum += norm.ln();
            log_count += 1;
        }
        let converged = (norm - lambda).abs() <= POWER_ITERATION_TOLERANCE * norm;
        lambda = norm;
        if converged {
            return lambda;
        }
    }
    (log_sum / log_count as f64).exp()
}

/// Span or population standard deviation below the threshold.
fn is_degenerate(values: impl Iterator<Item = f64> + Clone) -> bool {
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut sum, mut count) = (0.0, 0usize);
    for v in values.clone() {
        min = min.min(v);
        max = max.max(v);
        sum += v;
        count += 1;
    }
    if count == 0 || max - min < DEGENERATE_PREDICTOR_THRESHOLD {
        return true;
    }
    let mean = sum / count as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    var.sqrt() < DEGENERATE_PREDICTOR_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Activation;

    fn time_point_cfg(neurons: usize) -> ReservoirConfig {
        ReservoirConfig {
            input: ReservoirInputConfig::default(),
            hidden: ReservoirHiddenConfig {
                num_neurons: neurons,
                density: 0.2,
                max_delay: 2,
                activation: Activation::TanH,
                ..ReservoirHiddenConfig::default()
            },
            predictors: PredictorsConfig::default(),
        }
    }

    fn random_stream(len: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| vec![rng.gen_range(-1.0..1.0)]).collect()
    }

    #[test]
    fn construction_is_deterministic() {
        let a = Reservoir::new(time_point_cfg(30), 7).unwrap();
        let b = Reservoir::new(time_point_cfg(30), 7).unwrap();
        let weights = |r: &Reservoir| -> Vec<f64> {
            r.hidden_neurons()
                .iter()
                .flat_map(|n| n.hidden_synapses.iter().chain(&n.input_synapses))
                .map(|s| s.weight)
                .collect()
        };
        assert_eq!(weights(&a), weights(&b));
        assert_eq!(a.num_synapses(), b.num_synapses());
    }

    #[test]
    fn every_neuron_gets_ring_connections_and_inputs() {
        let r = Reservoir::new(time_point_cfg(20), 1).unwrap();
        for n in r.hidden_neurons() {
            // density 0.2 * 20 = 4 rounds
            assert_eq!(n.hidden_synapses.len(), 4);
            assert_eq!(n.input_synapses.len(), 1);
            assert!(n.hidden_synapses.iter().all(|s| s.delay() <= 2));
            assert!(n.bias.abs() <= BIAS_RANGE);
        }
    }

    #[test]
    fn spectral_radius_is_normalized() {
        for seed in 0..3 {
            let r = Reservoir::new(time_point_cfg(40), seed).unwrap();
            let estimate = r.estimate_spectral_radius();
            assert!(
                (estimate - 0.9).abs() <= 1e-4 * 0.9,
                "seed {seed}: estimate {estimate}"
            );
        }
    }

    #[test]
    fn compute_before_init_is_invalid() {
        let mut r = Reservoir::new(time_point_cfg(10), 0).unwrap();
        assert!(matches!(
            r.push_time_point(&[0.0]),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            r.compute_pattern(&[0.0]),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn booting_countdown_gates_time_point_output() {
        let mut r = Reservoir::new(time_point_cfg(10), 0).unwrap();
        r.init(&random_stream(40, 1)).unwrap();
        r.reset();
        assert_eq!(r.booting_countdown(), 10);
        assert!(!r.is_ready());
        for _ in 0..9 {
            assert!(r.push_time_point(&[0.3]).unwrap().is_none());
        }
        let out = r.push_time_point(&[0.3]).unwrap().unwrap();
        assert!(r.is_ready());
        assert_eq!(out.len(), r.output_len());
        assert!(matches!(
            r.push_time_point(&[0.3, 0.1]),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn init_needs_a_stream_longer_than_booting() {
        let mut r = Reservoir::new(time_point_cfg(10), 0).unwrap();
        assert!(r.init(&random_stream(5, 0)).is_err());
        assert!(!r.is_initialized());
    }

    #[test]
    fn failed_reinit_keeps_previous_state() {
        let mut cfg = time_point_cfg(15);
        cfg.predictors.spikes_fading_trace = true;
        cfg.hidden.spike_threshold = 100.0;
        let mut r = Reservoir::new(cfg, 3).unwrap();
        let stream = random_stream(60, 2);
        r.init(&stream).unwrap();
        let width = r.output_len();
        let enabled = r.num_enabled_predictors();

        assert!(matches!(
            r.init(&stream[..5]),
            Err(Error::InvalidData(_))
        ));
        let mut bad = stream.clone();
        bad[40] = vec![f64::NAN];
        assert!(matches!(r.init(&bad), Err(Error::InvalidData(_))));

        assert!(r.is_ready());
        assert_eq!(r.num_enabled_predictors(), enabled);
        assert_eq!(r.output_len(), width);
        let out = r.push_time_point(&[0.2]).unwrap().unwrap();
        assert_eq!(out.len(), width);
    }

    #[test]
    fn silent_spike_traces_are_pruned() {
        let mut cfg = time_point_cfg(15);
        cfg.predictors.spikes_fading_trace = true;
        cfg.hidden.spike_threshold = 100.0;
        let mut r = Reservoir::new(cfg, 3).unwrap();
        let rows = r.init(&random_stream(60, 2)).unwrap();

        assert_eq!(r.section_len(Predictor::SpikesFadingTrace), 0);
        assert_eq!(r.section_len(Predictor::SquaredActivation), 0);
        assert!(r.section_len(Predictor::Activation) > 0);
        assert_eq!(rows.len(), 60 - 15 + 1);
        assert!(rows.iter().all(|row| row.len() == r.output_len()));
    }

    #[test]
    fn degenerate_detection() {
        assert!(is_degenerate([1.0, 1.0, 1.0].into_iter()));
        assert!(is_degenerate([1.0, 1.0 + 1e-8].into_iter()));
        assert!(!is_degenerate([0.0, 1.0].into_iter()));
    }
}
