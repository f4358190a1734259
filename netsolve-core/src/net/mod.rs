//! The seam between the hand-written training loop and a network runtime.
//!
//! A runtime only needs to expose what a scripting layer would: a forward
//! pass producing named scalar outputs, a way to seed the gradients of those
//! outputs, a backward pass, and its learnable parameter blobs. Everything
//! else (the update rule, the learning-rate schedule, batching) lives
//! outside of the net.

pub mod dense;

pub use dense::DenseNet;

use crate::batch::{Batch, Phase};
use crate::blob::Blob;
use crate::error::NetsolveError;
use std::collections::BTreeMap;

/// Name of the loss output every classifier in this crate produces.
pub const LOSS: &str = "loss";
/// Name of the top-1 accuracy output.
pub const ACCURACY: &str = "accuracy";

/// Scalar outputs of one forward pass, keyed by output name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetOutputs {
    values: BTreeMap<String, f32>,
}

impl NetOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f32) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }

    /// Like [`get`](Self::get), but missing outputs are an error.
    pub fn require(&self, name: &str) -> Result<f32, NetsolveError> {
        self.get(name)
            .ok_or_else(|| NetsolveError::UnknownOutput(name.to_string()))
    }

    pub fn loss(&self) -> Option<f32> {
        self.get(LOSS)
    }

    pub fn accuracy(&self) -> Option<f32> {
        self.get(ACCURACY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// A computational graph whose forward and backward passes are driven from
/// the outside.
pub trait Net: std::fmt::Debug {
    /// Shape `[c, h, w]` of one input sample.
    fn input_shape(&self) -> &[usize];

    /// Runs the graph on `batch` and returns its scalar outputs.
    ///
    /// # Errors
    /// Returns `NetsolveError` if the batch does not match
    /// [`input_shape`](Self::input_shape) or carries invalid labels.
    fn forward(&mut self, batch: &Batch, phase: Phase) -> Result<NetOutputs, NetsolveError>;

    /// Loss outputs together with the weight their gradient is seeded with.
    fn loss_weights(&self) -> Vec<(String, f32)>;

    /// Sets the gradient seed of the named output for the next backward pass.
    fn set_output_diff(&mut self, name: &str, value: f32) -> Result<(), NetsolveError>;

    /// Back-propagates from the seeded outputs into every learnable blob's diff.
    ///
    /// Each call overwrites the diffs of the previous one.
    fn backward(&mut self) -> Result<(), NetsolveError>;

    /// Learnable parameters in a stable order, with their names.
    fn learnable_params(&self) -> Vec<(String, &Blob)>;

    /// Learnable parameters in the same order as
    /// [`learnable_params`](Self::learnable_params).
    fn learnable_params_mut(&mut self) -> Vec<&mut Blob>;

    fn param_by_name(&self, name: &str) -> Option<&Blob> {
        self.learnable_params()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }

    /// Total number of learnable scalars.
    fn num_params(&self) -> usize {
        self.learnable_params().iter().map(|(_, b)| b.count()).sum()
    }
}
