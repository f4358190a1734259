use crate::error::NetsolveError;
use std::fmt;

/// A value buffer paired with a gradient ("diff") buffer of the same size.
///
/// Blobs are the unit of exchange between the training loop and a [`Net`]:
/// the net fills `diff` during backward, the update rule reads `diff` and
/// writes `data`.
///
/// [`Net`]: crate::net::Net
#[derive(Clone, PartialEq)]
pub struct Blob {
    shape: Vec<usize>,
    data: Vec<f32>,
    diff: Vec<f32>,
}

impl Blob {
    /// Creates a zero-filled blob of the given shape.
    pub fn new(shape: Vec<usize>) -> Self {
        let count = shape.iter().product();
        Blob {
            shape,
            data: vec![0.0; count],
            diff: vec![0.0; count],
        }
    }

    /// Wraps existing values. The diff starts at zero.
    ///
    /// # Errors
    /// `ShapeMismatch` if `data.len()` is not the product of `shape`.
    pub fn from_data(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, NetsolveError> {
        let count: usize = shape.iter().product();
        if data.len() != count {
            return Err(NetsolveError::shape(&[count], &[data.len()], "Blob::from_data"));
        }
        Ok(Blob {
            shape,
            diff: vec![0.0; count],
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn diff(&self) -> &[f32] {
        &self.diff
    }

    pub fn diff_mut(&mut self) -> &mut [f32] {
        &mut self.diff
    }

    /// Borrows both buffers at once, values read-write and gradients read-only.
    pub fn data_and_diff_mut(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.data, &self.diff)
    }

    pub fn zero_diff(&mut self) {
        self.diff.fill(0.0);
    }

    /// Fills the whole gradient buffer with `value`.
    pub fn set_diff(&mut self, value: f32) {
        self.diff.fill(value);
    }

    pub fn sumsq_data(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum()
    }

    pub fn sumsq_diff(&self) -> f32 {
        self.diff.iter().map(|x| x * x).sum()
    }

    /// Changes the logical shape without touching the buffers.
    ///
    /// # Errors
    /// `ShapeMismatch` if the element count would change.
    pub fn reshape(&mut self, shape: Vec<usize>) -> Result<(), NetsolveError> {
        let count: usize = shape.iter().product();
        if count != self.count() {
            return Err(NetsolveError::shape(&[self.count()], &[count], "Blob::reshape"));
        }
        self.shape = shape;
        Ok(())
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Buffers can be large; print the shape and a couple of norms instead.
        f.debug_struct("Blob")
            .field("shape", &self.shape)
            .field("sumsq_data", &self.sumsq_data())
            .field("sumsq_diff", &self.sumsq_diff())
            .finish()
    }
}

#[cfg(test)]
#[path = "blob_test.rs"]
mod tests;
