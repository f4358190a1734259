//! Learning-rate policies and the hand-written SGD update.
//!
//! Nothing here touches a runtime's own solver: the update reads the diffs a
//! [`Net`](crate::net::Net) leaves behind after backward and writes the
//! parameter values directly.

pub mod lr_policy;
pub mod sgd;

pub use lr_policy::{LrPolicy, LrSchedule};
pub use sgd::{zero_diffs, SgdUpdate};
