//! Heap error types

use thiserror::Error;

/// Errors surfaced by fallible heap operations.
///
/// Allocation exhaustion is deliberately *not* represented here: `alloc`
/// returns `None` and callers decide. Precondition violations (out-of-range
/// small ints, reading a non-object slot as an object, unbalanced heap
/// guards) panic instead.
#[derive(Debug, Error)]
pub enum HeapError {
    /// An adopted image failed validation (bad magic, bad root offset).
    #[error("invalid heap image: {0}")]
    InvalidHeap(&'static str),

    /// An argument violated a documented constraint (e.g. `resize` below
    /// `used`, or growing an owned heap).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The heap ran out of space while building a structure that cannot be
    /// partially constructed (JSON import).
    #[error("out of memory")]
    OutOfMemory,

    /// Malformed JSON handed to the import bridge.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for heap results.
pub type Result<T> = std::result::Result<T, HeapError>;
