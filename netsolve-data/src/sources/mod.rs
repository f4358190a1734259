//! Where serialized records come from.

pub mod lmdb;
pub mod vec_source;

pub use lmdb::{LmdbSource, LmdbWriter};
pub use vec_source::VecSource;

use netsolve_core::NetsolveError;

/// A sequential, restartable stream of serialized records.
pub trait RecordSource {
    /// Returns the next record, or `None` once the source is exhausted.
    fn next_record(&mut self) -> Result<Option<Vec<u8>>, NetsolveError>;

    /// Restarts the stream from its first record.
    fn rewind(&mut self) -> Result<(), NetsolveError>;

    /// Total number of records, when cheaply known.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>, NetsolveError> {
        (**self).next_record()
    }

    fn rewind(&mut self) -> Result<(), NetsolveError> {
        (**self).rewind()
    }

    fn len_hint(&self) -> Option<usize> {
        (**self).len_hint()
    }
}
