//! # BatchLoader
//!
//! Groups the records of a [`RecordSource`] into fixed-shape [`Batch`]es.
//!
//! ```rust
//! use netsolve_data::datum::Datum;
//! use netsolve_data::loader::{BatchLoader, ExhaustionPolicy};
//! use netsolve_data::sources::VecSource;
//! use netsolve_data::transform::DatumTransform;
//!
//! let datums: Vec<Datum> = (0..6)
//!     .map(|i| Datum::from_pixels(1, 1, 1, vec![i as u8], i % 2))
//!     .collect();
//! let source = VecSource::from_datums(&datums);
//! let loader = BatchLoader::new(source, 2, [1, 1, 1], DatumTransform::default(), ExhaustionPolicy::Stop)
//!     .expect("valid loader");
//! for batch in loader {
//!     let batch = batch.expect("no decode error expected");
//!     assert_eq!(batch.num(), 2);
//! }
//! ```

use crate::datum::Datum;
use crate::sources::RecordSource;
use crate::transform::DatumTransform;
use log::{debug, warn};
use netsolve_core::{Batch, NetsolveError};

/// What to do when the source runs out in the middle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Drop the partial batch and end the sequence.
    #[default]
    Stop,
    /// Rewind the source and keep filling; the sequence never ends unless
    /// the source is empty.
    Rewind,
    /// Yield `SourceExhausted` once, then end.
    Error,
}

/// Lazily decodes, transforms and batches records.
///
/// Every batch holds exactly `batch_size` samples of shape `sample_shape`.
pub struct BatchLoader<S: RecordSource> {
    source: S,
    batch_size: usize,
    sample_shape: [usize; 3],
    transform: DatumTransform,
    policy: ExhaustionPolicy,
    finished: bool,
}

impl<S: RecordSource> BatchLoader<S> {
    /// # Errors
    /// `ConfigurationError` for a zero batch size or an empty sample shape.
    pub fn new(
        source: S,
        batch_size: usize,
        sample_shape: [usize; 3],
        transform: DatumTransform,
        policy: ExhaustionPolicy,
    ) -> Result<Self, NetsolveError> {
        if batch_size == 0 {
            return Err(NetsolveError::ConfigurationError(
                "BatchLoader: batch_size must be positive".to_string(),
            ));
        }
        if sample_shape.iter().any(|&d| d == 0) {
            return Err(NetsolveError::ConfigurationError(format!(
                "BatchLoader: sample shape {:?} has an empty dimension",
                sample_shape
            )));
        }
        Ok(BatchLoader {
            source,
            batch_size,
            sample_shape,
            transform,
            policy,
            finished: false,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn sample_shape(&self) -> [usize; 3] {
        self.sample_shape
    }

    pub fn policy(&self) -> ExhaustionPolicy {
        self.policy
    }

    /// Number of full batches one pass over the source yields, when the
    /// source knows its length.
    pub fn batches_per_pass(&self) -> Option<usize> {
        self.source.len_hint().map(|n| n / self.batch_size)
    }

    /// Rewinds the source; the next batch starts a new pass.
    pub fn reset(&mut self) -> Result<(), NetsolveError> {
        self.source.rewind()?;
        self.finished = false;
        Ok(())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn decode(&self, record: &[u8], values: &mut Vec<f32>) -> Result<f32, NetsolveError> {
        let datum = Datum::decode_record(record)?;
        let shape = datum.shape()?;
        if shape != self.sample_shape {
            return Err(NetsolveError::shape(&self.sample_shape, &shape, "BatchLoader (record shape)"));
        }
        values.extend(self.transform.apply(&datum)?);
        Ok(datum.label() as f32)
    }

    /// Assembles the next batch; `Ok(None)` once the sequence has ended.
    pub fn next_batch(&mut self) -> Result<Option<Batch>, NetsolveError> {
        if self.finished {
            return Ok(None);
        }
        let dim: usize = self.sample_shape.iter().product();
        let mut values = Vec::with_capacity(self.batch_size * dim);
        let mut labels = Vec::with_capacity(self.batch_size);
        let mut rewound_without_progress = false;

        while labels.len() < self.batch_size {
            match self.source.next_record()? {
                Some(record) => {
                    rewound_without_progress = false;
                    labels.push(self.decode(&record, &mut values)?);
                }
                None => match self.policy {
                    ExhaustionPolicy::Stop => {
                        if !labels.is_empty() {
                            warn!(
                                "BatchLoader: source exhausted mid-batch, dropping {} of {} samples",
                                labels.len(),
                                self.batch_size
                            );
                        }
                        self.finished = true;
                        return Ok(None);
                    }
                    ExhaustionPolicy::Error => {
                        self.finished = true;
                        if labels.is_empty() {
                            return Ok(None);
                        }
                        return Err(NetsolveError::SourceExhausted {
                            wanted: self.batch_size,
                            got: labels.len(),
                        });
                    }
                    ExhaustionPolicy::Rewind => {
                        if rewound_without_progress {
                            warn!("BatchLoader: source is empty, nothing to rewind into");
                            self.finished = true;
                            return Ok(None);
                        }
                        debug!("BatchLoader: rewinding source");
                        self.source.rewind()?;
                        rewound_without_progress = true;
                    }
                },
            }
        }

        Batch::new(values, &self.sample_shape, labels).map(Some)
    }
}

impl<S: RecordSource> Iterator for BatchLoader<S> {
    type Item = Result<Batch, NetsolveError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod tests;
