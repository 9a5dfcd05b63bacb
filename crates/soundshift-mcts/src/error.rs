//! Caller-visible error types.
//!
//! Programmer errors (selection on an unexpanded node, backup without a
//! matching virtual select) are asserts, not errors — they indicate a broken
//! driver, and the process is not expected to continue.

use thiserror::Error;

/// Errors surfaced to the host without mutating node state.
#[derive(Debug, Error)]
pub enum MctsError {
    #[error("action index {index} out of bounds for a node with {len} actions")]
    OutOfBounds { index: usize, len: usize },

    #[error("edge at index {index} has not been explored")]
    UnexploredEdge { index: usize },

    #[error("padding cell ({row}, {col}) holds a non-pad symbol")]
    BadPadding { row: usize, col: usize },
}

/// Result type for fallible core operations.
pub type Result<T> = std::result::Result<T, MctsError>;
