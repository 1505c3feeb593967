//! Generation error taxonomy.

use thiserror::Error;

pub type GenResult<T> = Result<T, GenError>;

/// Errors raised during program generation.
///
/// A dead end is expected and recoverable: the driver discards the whole
/// in-progress file and retries with a new seed. An invariant failure is a
/// defect in the generator itself and must propagate until the run aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenError {
    /// No legal production remains for the current type, context and
    /// ownership constraints.
    #[error("no legal production remains for {wanted}")]
    DeadEnd { wanted: String },

    /// The generator broke one of its own guarantees (an unresolvable name,
    /// a generator invoked for a type it does not support, ...).
    #[error("generator invariant broken: {0}")]
    Invariant(String),
}

impl GenError {
    pub fn dead_end(wanted: impl Into<String>) -> Self {
        GenError::DeadEnd {
            wanted: wanted.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        GenError::Invariant(message.into())
    }

    pub fn is_dead_end(&self) -> bool {
        matches!(self, GenError::DeadEnd { .. })
    }
}
