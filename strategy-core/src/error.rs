use thiserror::Error;

/// Errors surfaced by the concurrency core.
///
/// Cancellation is deliberately its own variant so callers can always tell
/// "asked to stop" apart from "something broke".
#[derive(Debug, Error)]
pub enum CoreError {
    /// The operation was canceled by a stop token or by disposing its owner.
    #[error("operation canceled")]
    Canceled,

    /// A lifecycle method was called after the instance had already started.
    #[error("instance already started")]
    AlreadyStarted,

    /// The first fault raised by a user handler during delivery.
    #[error("handler failed: {0}")]
    Handler(anyhow::Error),

    /// A terminal fault raised by the underlying source.
    #[error("source failed: {0}")]
    Source(anyhow::Error),

    /// Work was posted to an execution host that has shut down.
    #[error("execution host has stopped")]
    HostStopped,
}
