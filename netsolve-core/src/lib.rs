//! Core types for driving a network runtime by hand: blobs, batches, the
//! [`Net`] seam, a reference dense classifier, learning-rate policies and
//! the SGD update rule.

pub mod batch;
pub mod blob;
pub mod error;
pub mod init;
pub mod net;
pub mod optim;

pub use batch::{Batch, Phase};
pub use blob::Blob;
pub use error::NetsolveError;
pub use net::{DenseNet, Net, NetOutputs};
