//! Error types for the instrumentation layer.

use thiserror::Error;

use crate::proxy::Shape;

/// Errors surfaced by the wrapping layer.
///
/// Rejected writes to the metadata slot are deliberately absent: those
/// report "not performed" through the `bool` returned by
/// [`Proxy::set`](crate::proxy::Proxy::set) and
/// [`Proxy::delete`](crate::proxy::Proxy::delete).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    /// The value carries no node metadata, so there is nothing to listen to.
    #[error("cannot listen to a value that is not instrumented")]
    NotInstrumented,

    /// An attempt to change the shape of an instrumented container.
    #[error("cannot turn an instrumented {expected} into {found}")]
    ProtocolViolation {
        /// Shape of the instrumented container.
        expected: Shape,
        /// Kind of the value that was offered instead.
        found: &'static str,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProxyError>;
