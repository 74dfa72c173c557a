//! Contiguous sample storage.
//!
//! The trainer indexes samples by position and hands out row slices to its workers,
//! so inputs and ideal outputs are kept as two row-major `f64` buffers.

use crate::{Error, Result};

/// An ordered collection of input/output vector pairs.
///
/// Stored as contiguous buffers with row-major layout:
/// - `inputs.len() == len * input_dim`
/// - `outputs.len() == len * output_dim`
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDataset {
    inputs: Vec<f64>,
    outputs: Vec<f64>,
    len: usize,
    input_dim: usize,
    output_dim: usize,
}

impl SampleDataset {
    /// Build a dataset from flat buffers.
    ///
    /// `inputs` is `(len, input_dim)` and `outputs` is `(len, output_dim)`.
    pub fn from_flat(
        inputs: Vec<f64>,
        outputs: Vec<f64>,
        input_dim: usize,
        output_dim: usize,
    ) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if output_dim == 0 {
            return Err(Error::InvalidData("output_dim must be > 0".to_owned()));
        }
        if !inputs.len().is_multiple_of(input_dim) {
            return Err(Error::InvalidData(format!(
                "inputs length {} is not divisible by input_dim {}",
                inputs.len(),
                input_dim
            )));
        }

        let len = inputs.len() / input_dim;
        if outputs.len() != len * output_dim {
            return Err(Error::InvalidData(format!(
                "outputs length {} does not match len * output_dim ({} * {})",
                outputs.len(),
                len,
                output_dim
            )));
        }
        if inputs.iter().chain(outputs.iter()).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "samples must contain only finite values".to_owned(),
            ));
        }

        Ok(Self {
            inputs,
            outputs,
            len,
            input_dim,
            output_dim,
        })
    }

    /// Build a dataset from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(inputs: &[Vec<f64>], outputs: &[Vec<f64>]) -> Result<Self> {
        if inputs.len() != outputs.len() {
            return Err(Error::InvalidData(format!(
                "inputs/outputs length mismatch: {} vs {}",
                inputs.len(),
                outputs.len()
            )));
        }
        if inputs.is_empty() {
            return Err(Error::InvalidData("dataset must not be empty".to_owned()));
        }

        let input_dim = inputs[0].len();
        let output_dim = outputs[0].len();
        let mut inputs_flat = Vec::with_capacity(inputs.len() * input_dim);
        let mut outputs_flat = Vec::with_capacity(outputs.len() * output_dim);

        for (i, (x, y)) in inputs.iter().zip(outputs).enumerate() {
            if x.len() != input_dim {
                return Err(Error::InvalidData(format!(
                    "input row {i} has len {}, expected {input_dim}",
                    x.len()
                )));
            }
            if y.len() != output_dim {
                return Err(Error::InvalidData(format!(
                    "output row {i} has len {}, expected {output_dim}",
                    y.len()
                )));
            }
            inputs_flat.extend_from_slice(x);
            outputs_flat.extend_from_slice(y);
        }

        Self::from_flat(inputs_flat, outputs_flat, input_dim, output_dim)
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    #[inline]
    /// Returns the `idx`-th input row.
    ///
    /// Panics if `idx >= len`.
    pub fn input(&self, idx: usize) -> &[f64] {
        let start = idx * self.input_dim;
        &self.inputs[start..start + self.input_dim]
    }

    #[inline]
    /// Returns the `idx`-th ideal output row.
    ///
    /// Panics if `idx >= len`.
    pub fn output(&self, idx: usize) -> &[f64] {
        let start = idx * self.output_dim;
        &self.outputs[start..start + self.output_dim]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flat_validates_shapes() {
        let ok = SampleDataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 1.0], 2, 1);
        assert!(ok.is_ok());

        let err = SampleDataset::from_flat(vec![0.0, 1.0, 2.0], vec![0.0], 2, 1);
        assert!(err.is_err());

        let err = SampleDataset::from_flat(vec![0.0, 1.0], vec![0.0, 1.0], 2, 1);
        assert!(err.is_err());
    }

    #[test]
    fn from_rows_rejects_ragged_rows_and_non_finite_values() {
        let xs = vec![vec![0.0, 1.0], vec![2.0]];
        let ys = vec![vec![0.0], vec![1.0]];
        assert!(SampleDataset::from_rows(&xs, &ys).is_err());

        let xs = vec![vec![0.0, f64::NAN]];
        let ys = vec![vec![0.0]];
        assert!(SampleDataset::from_rows(&xs, &ys).is_err());
    }

    #[test]
    fn rows_are_addressable() {
        let xs = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let ys = vec![vec![5.0], vec![6.0]];
        let data = SampleDataset::from_rows(&xs, &ys).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.input(1), &[3.0, 4.0]);
        assert_eq!(data.output(0), &[5.0]);
    }
}
