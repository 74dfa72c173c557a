//! Dense MLP training engine plus a reservoir-computing preprocessor.
//!
//! `reservoir-mlp` has two halves:
//!
//! - An MLP engine ([`MlpEngine`]) over a single flat weight buffer, trained by a
//!   mini-batch [`Trainer`] with a closed family of optimizers ([`Optimizer`]), L1/L2
//!   regularization, dropout, gradient clipping and neuron norm constraints. The
//!   [`NetworkModelBuilder`] drives the trainer over attempts and epochs and keeps the
//!   best model.
//! - A recurrent [`Reservoir`] that turns time series into fixed-size predictor
//!   vectors through sparse delay-line synapses and spectral-radius normalization.
//!
//! # Panics vs `Result`
//!
//! - Low-level hot paths panic on misuse (shape mismatches are programmer error):
//!   [`MlpEngine::compute_into`], [`Synapse::pull`].
//! - Everything else validates its inputs and returns [`Result`].
//!
//! # Data layout
//!
//! - Scalars are `f64`.
//! - [`SampleDataset`] stores samples contiguously in row-major layout.
//! - The engine's flat weight buffer holds, per layer, the row-major
//!   `(neurons, inputs)` weight block followed by the biases. Layers follow each other
//!   with no gaps.
//! - Flat node buffers (activations, sums) hold the network inputs followed by the
//!   neurons of every layer.
//!
//! # Concurrency
//!
//! Batches, dataset evaluation and large reservoirs are processed on the rayon pool.
//! Workers only read the weights; the single update step between batches writes them.
//!
//! # Logging
//!
//! The crate logs through the `log` facade and never installs a logger.
//!
//! # Quick start
//!
//! ```rust
//! use reservoir_mlp::{
//!     Activation, HiddenLayerConfig, MlpEngine, NetworkModelBuilder, NetworkModelConfig,
//!     Optimizer, SampleDataset, TaskType,
//! };
//!
//! # fn main() -> reservoir_mlp::Result<()> {
//! let xs = vec![
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ];
//! let ys = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
//! let train = SampleDataset::from_rows(&xs, &ys)?;
//!
//! let cfg = NetworkModelConfig {
//!     hidden_layers: vec![HiddenLayerConfig::new(8, Activation::TanH)],
//!     optimizer: Optimizer::adam(0.05),
//!     max_attempt_epochs: 50,
//!     ..NetworkModelConfig::default()
//! };
//! let template = MlpEngine::new(TaskType::Binary, 2, vec!["xor".to_owned()], &cfg)?;
//! let model = NetworkModelBuilder::new(cfg, 0).build(&template, &train, None, |_| {})?;
//!
//! let y = model.compute(&[1.0, 0.0])?;
//! assert_eq!(y.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod config;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod mlp;
pub mod optim;
pub mod reservoir;
pub mod train;

#[cfg(feature = "serde")]
pub mod snapshot;

pub use activation::Activation;
pub use builder::{BuildProgress, ModelSnapshot, NetworkModel, NetworkModelBuilder};
pub use config::{
    BatchSize, HiddenLayerConfig, InputOptions, NetworkModelConfig, NormConstraint,
    OutputOptions, Regularization, TaskType, ThrottleValve,
};
pub use data::SampleDataset;
pub use error::{Error, Result};
pub use layer::Layer;
pub use loss::Loss;
pub use metrics::ErrorStat;
pub use mlp::{MlpEngine, WeightStats};
pub use optim::{Optimizer, OptimizerState};
pub use reservoir::{
    InputFeeding, Predictor, PredictorsConfig, Reservoir, ReservoirConfig, ReservoirHiddenConfig,
    ReservoirInputConfig, ReservoirNeuron, Synapse, SynapseSource,
};
pub use train::{Trainer, clip_gradients_by_norm, clip_gradients_by_value};
