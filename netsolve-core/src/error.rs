use thiserror::Error;

/// Custom error type for the netsolve crates.
///
/// Errors from third-party crates (LMDB, protobuf, I/O, config parsing) are
/// converted into the string-carrying variants at the crate boundary, which
/// keeps this type `Clone + PartialEq` for tests.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum NetsolveError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index out of bounds: index {index} for length {len} in {context}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: String,
    },

    #[error("Unknown output or parameter name: {0}")]
    UnknownOutput(String),

    #[error("Operation '{operation}' is not allowed after a {phase} phase forward pass")]
    PhaseError { operation: String, phase: String },

    #[error("Backward called without a preceding train-phase forward pass")]
    BackwardBeforeForward,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Evaluation consumed no batches")]
    EmptyEvaluation,

    #[error("Record source exhausted mid-batch: wanted {wanted} records, got {got}")]
    SourceExhausted { wanted: usize, got: usize },

    #[error("Unsupported record: {0}")]
    UnsupportedRecord(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Config parse error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for NetsolveError {
    fn from(err: std::io::Error) -> Self {
        NetsolveError::Io(err.to_string())
    }
}

impl NetsolveError {
    /// Shorthand for the most common shape check failure.
    pub fn shape(expected: &[usize], actual: &[usize], operation: &str) -> Self {
        NetsolveError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
            operation: operation.to_string(),
        }
    }
}
