//! The training driver: solver configuration, the SGD loop with periodic
//! evaluation and snapshots.

pub mod config;
pub mod eval;
pub mod snapshot;
pub mod solver;

pub use config::SolverConfig;
pub use eval::{evaluate, EvalReport};
pub use snapshot::{NamedBlob, Snapshot};
pub use solver::{EpochReport, SolveSummary, Solver, StepReport};
