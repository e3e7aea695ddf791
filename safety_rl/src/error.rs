//! Error type shared by every learner in the crate.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SafetyRlError>;

/// Errors raised by the backup engines and their training loops.
#[derive(Debug)]
pub enum SafetyRlError {
    /// A warm-started table does not match the discretisation.
    ShapeMismatch {
        /// Shape implied by `grid_cells + [num_actions]`.
        expected: Vec<usize>,
        /// Shape that was supplied.
        found: Vec<usize>,
    },
    /// Configuration values that cannot be used together or are out of range.
    InvalidConfig(String),
    /// A margin reported by the environment was NaN or infinite.
    InvalidMargins {
        /// Which margin was rejected (`g_x`, `l_x`, `g_x_nxt`, `l_x_nxt`).
        field: &'static str,
        /// The offending value.
        value: f32,
    },
    /// A minibatch column (or a row inside it) has the wrong length.
    BatchMismatch {
        /// Column name.
        field: &'static str,
        /// Batch size, or the row width for per-row fields.
        expected: usize,
        /// Length that was supplied.
        found: usize,
    },
    /// Loss or gradient norm was NaN or infinite; the optimizer step was not
    /// applied.
    NonFiniteLoss {
        /// Network whose update was skipped.
        network: &'static str,
        /// The offending loss or gradient norm.
        value: f32,
    },
    /// Episode statistics were requested for an episode with no transitions.
    EmptyEpisode,
    /// IO error while persisting tables or statistics.
    Io(io::Error),
    /// JSON (de)serialization failure.
    Serialization(String),
    /// Burn recorder failure while saving or loading a network.
    Recorder(String),
}

impl fmt::Display for SafetyRlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyRlError::ShapeMismatch { expected, found } => write!(
                f,
                "value table shape {:?} does not match discretisation shape {:?}",
                found, expected
            ),
            SafetyRlError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            SafetyRlError::InvalidMargins { field, value } => {
                write!(f, "margin {} must be finite, got {}", field, value)
            }
            SafetyRlError::BatchMismatch {
                field,
                expected,
                found,
            } => write!(f, "batch field {} has length {}, expected {}", field, found, expected),
            SafetyRlError::NonFiniteLoss { network, value } => {
                write!(f, "{} update is not finite ({}), skipped", network, value)
            }
            SafetyRlError::EmptyEpisode => write!(f, "episode produced no transitions"),
            SafetyRlError::Io(e) => write!(f, "IO error: {}", e),
            SafetyRlError::Serialization(e) => write!(f, "serialization error: {}", e),
            SafetyRlError::Recorder(e) => write!(f, "recorder error: {}", e),
        }
    }
}

impl std::error::Error for SafetyRlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SafetyRlError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SafetyRlError {
    fn from(e: io::Error) -> Self {
        SafetyRlError::Io(e)
    }
}

impl From<serde_json::Error> for SafetyRlError {
    fn from(e: serde_json::Error) -> Self {
        SafetyRlError::Serialization(e.to_string())
    }
}
