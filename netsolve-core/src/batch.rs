use crate::blob::Blob;
use crate::error::NetsolveError;
use std::fmt;

/// Whether a forward pass is part of training or inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Test,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Test => write!(f, "test"),
        }
    }
}

/// A fixed-size group of same-shaped samples plus one label per sample.
///
/// `data` is laid out `[n, c, h, w]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub data: Blob,
    pub labels: Vec<f32>,
}

impl Batch {
    /// Builds a batch from flat sample values.
    ///
    /// # Errors
    /// `ShapeMismatch` if `values` does not hold `labels.len()` samples of
    /// `sample_shape`, or if `sample_shape` is not three-dimensional.
    pub fn new(
        values: Vec<f32>,
        sample_shape: &[usize],
        labels: Vec<f32>,
    ) -> Result<Self, NetsolveError> {
        if sample_shape.len() != 3 {
            return Err(NetsolveError::DimensionMismatch {
                expected: 3,
                actual: sample_shape.len(),
            });
        }
        let mut shape = Vec::with_capacity(4);
        shape.push(labels.len());
        shape.extend_from_slice(sample_shape);
        let data = Blob::from_data(values, shape)?;
        Ok(Batch { data, labels })
    }

    /// Number of samples.
    pub fn num(&self) -> usize {
        self.labels.len()
    }

    /// `[c, h, w]` of a single sample.
    pub fn sample_shape(&self) -> &[usize] {
        &self.data.shape()[1..]
    }

    /// Flat values of sample `i`.
    pub fn sample(&self, i: usize) -> &[f32] {
        let dim: usize = self.sample_shape().iter().product();
        &self.data.data()[i * dim..(i + 1) * dim]
    }
}
