use thiserror::Error;

/// Errors raised while building asset models or assembling a problem.
///
/// Solver outcomes (infeasible, unbounded, timed out) are not errors; they are
/// reported through [`crate::optimizer::SolveStatus`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Variable name already declared in this problem: {0}")]
    DuplicateVariable(String),

    #[error("Cannot aggregate an empty set of asset models")]
    EmptyAggregate,
}

impl ModelError {
    pub fn dimension(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        ModelError::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

impl From<validator::ValidationErrors> for ModelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ModelError::InvalidParameter(errors.to_string())
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
