use thiserror::Error;

/// Failures that callers may want to match on. Everything else travels as a
/// plain `anyhow` message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid run number \"{0}\": expected a .dat suffix or up to four trailing digits")]
    InvalidRunNumber(String),

    #[error("Array must have at least {required} dimensions, got {actual}")]
    DimensionTooLow { required: usize, actual: usize },

    #[error("Coordinates are not strictly increasing at index {index}")]
    NotStrictlyIncreasing { index: usize },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Quantity {0} has not been loaded")]
    MissingQuantity(&'static str),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Species mismatch for run {run}: coefficient table has \"{expected}\", run has \"{actual}\"")]
    SpeciesMismatch {
        run: String,
        expected: String,
        actual: String,
    },

    #[error("Reconstruction of {quantity} deviates by {max_error:e} (tolerance {tolerance:e})")]
    ReconstructionFailed {
        quantity: &'static str,
        max_error: f64,
        tolerance: f64,
    },

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}
