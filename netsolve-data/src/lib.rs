//! Record decoding, record sources and batch loading.
//!
//! Records are serialized [`Datum`]s read sequentially from a
//! [`RecordSource`] (LMDB or in-memory), transformed with a constant mean
//! offset and scale, and grouped into fixed-shape batches by
//! [`BatchLoader`].

pub mod datum;
pub mod loader;
pub mod mnist;
pub mod sources;
pub mod transform;

pub use datum::Datum;
pub use loader::{BatchLoader, ExhaustionPolicy};
pub use sources::{LmdbSource, LmdbWriter, RecordSource, VecSource};
pub use transform::{DatumTransform, MeanSubtraction};
