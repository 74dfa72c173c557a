//! Engine snapshots (feature: `serde`).
//!
//! A snapshot is an opaque, versioned byte blob holding the engine topology and its
//! final weights. Optimizer state is not part of it.
//!
//! The payload is its own struct rather than `MlpEngine` itself, so the format stays
//! stable if the in-memory layout changes. Decoding validates the version, the
//! topology and that all weights are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, MlpEngine, Result, TaskType};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEngine {
    pub format_version: u32,
    pub task: TaskType,
    pub num_inputs: usize,
    pub output_feature_names: Vec<String>,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub num_inputs: usize,
    pub num_neurons: usize,
    pub activation: Activation,
    /// Row-major (num_neurons, num_inputs).
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl From<&MlpEngine> for SerializedEngine {
    fn from(engine: &MlpEngine) -> Self {
        let w = engine.weights();
        let layers = engine
            .layers()
            .iter()
            .map(|l| SerializedLayer {
                num_inputs: l.num_inputs,
                num_neurons: l.num_neurons,
                activation: l.activation,
                weights: w[l.weights_start..l.biases_start].to_vec(),
                biases: w[l.biases_start..l.weights_end()].to_vec(),
            })
            .collect();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            task: engine.task(),
            num_inputs: engine.num_inputs(),
            output_feature_names: engine.output_feature_names().to_vec(),
            layers,
        }
    }
}

impl TryFrom<SerializedEngine> for MlpEngine {
    type Error = Error;

    fn try_from(value: SerializedEngine) -> std::result::Result<Self, Self::Error> {
        if value.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported snapshot format_version {}; expected {}",
                value.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        let Some((output, hidden)) = value.layers.split_last() else {
            return Err(Error::InvalidData(
                "snapshot must have at least one layer".to_owned(),
            ));
        };
        if output.num_neurons != value.output_feature_names.len() {
            return Err(Error::InvalidData(format!(
                "output layer has {} neurons but {} output features are named",
                output.num_neurons,
                value.output_feature_names.len()
            )));
        }

        let topology: Vec<_> = hidden
            .iter()
            .map(|l| (l.num_neurons, l.activation))
            .collect();
        let mut engine = MlpEngine::from_topology(
            value.task,
            value.num_inputs,
            value.output_feature_names,
            &topology,
        )
        .map_err(|e| Error::InvalidData(format!("invalid snapshot topology: {e}")))?;

        let mut weights = Vec::with_capacity(engine.num_weights());
        for (i, (stored, layer)) in value.layers.iter().zip(engine.layers()).enumerate() {
            if stored.num_inputs != layer.num_inputs || stored.activation != layer.activation {
                return Err(Error::InvalidData(format!(
                    "layer {i} does not match the rebuilt topology"
                )));
            }
            if stored.weights.len() != layer.num_inputs * layer.num_neurons
                || stored.biases.len() != layer.num_neurons
            {
                return Err(Error::InvalidData(format!(
                    "layer {i} parameter lengths do not match its shape"
                )));
            }
            weights.extend_from_slice(&stored.weights);
            weights.extend_from_slice(&stored.biases);
        }
        if weights.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "weights must contain only finite values".to_owned(),
            ));
        }

        engine.set_weights(&weights)?;
        Ok(engine)
    }
}

impl MlpEngine {
    /// Encode topology and weights into an opaque blob.
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&SerializedEngine::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize engine: {e}")))
    }

    /// Decode a blob produced by [`MlpEngine::to_snapshot`].
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self> {
        let ser: SerializedEngine = serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidData(format!("failed to parse engine snapshot: {e}")))?;
        ser.try_into()
    }

    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_snapshot()?;
        let p = path.as_ref();
        std::fs::write(p, bytes)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))
    }

    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let bytes = std::fs::read(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_snapshot(&bytes)
    }
}
