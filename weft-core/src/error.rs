//! Error types surfaced by the reactivity engine.
//!
//! Most misuse is reported as a development-mode warning rather than an
//! error (matching the engine's "warn and ignore" contract for cell
//! setters). The proxy layer is the exception: its write operations return
//! a `Result` so callers can observe rejected mutations.

use thiserror::Error;

/// Errors produced by reactive write operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A write or delete was attempted through a readonly wrapper, or the
    /// target slot holds a readonly cell that cannot be overwritten.
    #[error("write operation failed: target is readonly")]
    ReadonlyWrite,

    /// The key cannot address the target (for example, a string key used
    /// on an ordered sequence).
    #[error("key `{0}` is not valid for this target")]
    InvalidKey(String),

    /// The operation does not exist for this target kind (for example,
    /// `push` on a mapping).
    #[error("operation is not supported by this target kind")]
    UnsupportedOperation,
}
