// src/core/error.rs

use thiserror::Error;

/// Errors raised while building or addressing a sweep, and by the profiling [`Timer`].
///
/// These are programmer errors: they surface synchronously at registration time and are
/// never produced while tasks are being enumerated or executed.
///
/// [`Timer`]: crate::core::timer::Timer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    /// An axis was registered with a value or value list of the wrong shape.
    #[error("Invalid axis value: {0}")]
    TypeKind(String),
    /// An operation was called in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// A multi-index that does not address a point of the space.
    #[error("Index {index:?} does not address a point in a space with dimensions {dims:?}")]
    InvalidIndex {
        /// The offending multi-index.
        index: Vec<usize>,
        /// The dimensions of the space it was checked against.
        dims: Vec<usize>,
    },
    /// Registering the axis would make the task count overflow.
    #[error("Registering axis '{axis}' would make the sweep larger than {max} tasks", max = usize::MAX)]
    SpaceTooLarge {
        /// Display form of the axis identifier.
        axis: String,
    },
    /// A command template could not be shell-lexed.
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
}
