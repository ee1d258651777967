use std::error::Error as StdError;
use std::io::Error as IoError;
use std::sync::Arc;

use ulid::Ulid;

use crate::session::{Mode, Status};

/// BoxedError
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Errors that can happen while streaming a response.
///
/// The error is cheap to clone, so the same value can be recorded as a session's
/// terminal error and returned to the caller that observed it.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The sink could not accept writes when the session was opened.
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),
    /// An operation was attempted on a session that is no longer open.
    #[error("session `{id}` is {status}")]
    ClosedSession {
        /// Session id.
        id: Ulid,
        /// Status observed by the operation.
        status: Status,
    },
    /// Writing or flushing to the sink failed, typically because the client went away.
    #[error("emit failed: {0}")]
    Emit(#[source] Arc<IoError>),
    /// The producer yielded an error.
    #[error("producer failed: {0}")]
    Producer(#[source] Arc<dyn StdError + Send + Sync>),
    /// The operation does not fit the mode the session was opened with.
    #[error("session was opened in {actual} mode, expected {expected}")]
    ModeMismatch {
        /// Mode the operation requires.
        expected: Mode,
        /// Mode of the session.
        actual: Mode,
    },
    /// Asynchronous production was requested but the emitter has no worker pool.
    #[error("emitter has no worker pool")]
    MissingWorkerPool,
    /// The worker pool no longer accepts tasks.
    #[error("worker pool is shut down")]
    PoolShutdown,
    /// The producer task was cancelled before the stream ended.
    #[error("producer cancelled")]
    Cancelled,
}

impl Error {
    /// Create an `Emit` error from an io error.
    #[inline]
    pub fn emit(err: IoError) -> Self {
        Self::Emit(Arc::new(err))
    }

    /// Create a `Producer` error from any error.
    #[inline]
    pub fn producer<E: Into<BoxedError>>(err: E) -> Self {
        Self::Producer(Arc::from(err.into()))
    }

    /// Returns `true` if this error was caused by the transport.
    #[inline]
    #[must_use]
    pub fn is_emit(&self) -> bool {
        matches!(self, Self::Emit(_))
    }

    /// Returns `true` if this error reports a write on a closed session.
    #[inline]
    #[must_use]
    pub fn is_closed_session(&self) -> bool {
        matches!(self, Self::ClosedSession { .. })
    }
}

impl From<IoError> for Error {
    #[inline]
    fn from(err: IoError) -> Self {
        Self::emit(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn test_display() {
        let err = Error::emit(IoError::new(ErrorKind::BrokenPipe, "client gone"));
        assert_eq!(err.to_string(), "emit failed: client gone");
        assert!(err.is_emit());

        let err = Error::producer("bad row");
        assert_eq!(err.to_string(), "producer failed: bad row");

        let err = Error::ModeMismatch {
            expected: Mode::Asynchronous,
            actual: Mode::Synchronous,
        };
        assert_eq!(
            err.to_string(),
            "session was opened in synchronous mode, expected asynchronous"
        );
    }

    #[test]
    fn test_source_is_kept() {
        let err = Error::emit(IoError::new(ErrorKind::ConnectionReset, "reset"));
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "reset");
    }

    #[test]
    fn test_clone_shares_source() {
        let err = Error::producer("boom");
        let cloned = err.clone();
        match (err, cloned) {
            (Error::Producer(a), Error::Producer(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("unexpected variants"),
        }
    }
}
