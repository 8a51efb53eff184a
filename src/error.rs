use thiserror::Error;

/// Errors returned by handle-addressed operations on a [`Signal`](crate::Signal).
///
/// Slot panics are deliberately *not* represented here: the crate never
/// catches them, they unwind through `emit` or through an evaluator drain.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The handle does not address a live subscription of the signal it was
    /// used with: it was disconnected, its signal was dropped, it belongs to
    /// a different signal, or it was default-constructed.
    #[error("connection handle does not address a live subscription of this signal")]
    UnknownHandle,
}
