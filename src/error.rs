use thiserror::Error;

/// Errors that end a session.
///
/// Each variant corresponds to one "give up and report" path: there are no
/// retries, and a failed session is never restarted. Internal-consistency
/// failures (lifecycle table violations, double buffer release) are not
/// represented here — those panic, because they indicate a broken contract
/// with the link adapter rather than a user-facing condition.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Hostname resolution failed or returned no addresses.
    #[error("hostname resolution failed: {0}")]
    Resolve(String),

    /// The TCP connect attempt was refused or errored.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The established link died with an I/O error (read or write side).
    #[error("connection lost: {0}")]
    Link(String),

    /// The link task went away without delivering a terminal event.
    #[error("event stream closed before the session ended")]
    EventStreamClosed,
}
