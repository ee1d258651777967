//! Stream session.
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use ulid::Ulid;

use crate::sink::Sink;
use crate::sse::{SseEvent, is_single_line};
use crate::{Error, Result, StreamItem};

/// How the producer of a session is driven.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Mode {
    /// The producer runs on the caller's task, which waits until the body is fully written.
    Synchronous,
    /// The producer runs on a worker pool and the caller gets the session back immediately.
    Asynchronous,
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronous => f.write_str("synchronous"),
            Self::Asynchronous => f.write_str("asynchronous"),
        }
    }
}

/// How items are turned into bytes on the wire.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Framing {
    /// Raw payload bytes, framing is left to the caller.
    #[default]
    Chunked,
    /// One server-sent event per item.
    Event,
}

/// Lifecycle status of a [`StreamSession`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Status {
    /// Writes are accepted.
    Open,
    /// The stream ended normally.
    Completed,
    /// The stream ended with an error.
    Failed,
}

impl Status {
    /// Returns `true` for `Completed` and `Failed`.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

struct State {
    status: Status,
    error: Option<Error>,
}

struct Inner<S> {
    id: Ulid,
    mode: Mode,
    framing: Framing,
    state: Mutex<State>,
    sequence: AtomicU64,
    sink: tokio::sync::Mutex<Option<S>>,
}

/// One in-flight streaming response.
///
/// The session owns its sink until it reaches a terminal status; the sink is released
/// exactly once, by whichever of [`complete`](Self::complete) or [`fail`](Self::fail)
/// runs first. Cloning the session clones the handle, not the stream.
pub struct StreamSession<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for StreamSession<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> Debug for StreamSession<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StreamSession")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("framing", &self.inner.framing)
            .field("status", &state.status)
            .field("error", &state.error)
            .finish()
    }
}

impl<S: Sink> StreamSession<S> {
    pub(crate) fn new(sink: S, mode: Mode, framing: Framing) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Ulid::new(),
                mode,
                framing,
                state: Mutex::new(State {
                    status: Status::Open,
                    error: None,
                }),
                sequence: AtomicU64::new(0),
                sink: tokio::sync::Mutex::new(Some(sink)),
            }),
        }
    }

    /// Session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Ulid {
        self.inner.id
    }

    /// Mode the session was opened with.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// Framing of the session.
    #[inline]
    #[must_use]
    pub fn framing(&self) -> Framing {
        self.inner.framing
    }

    /// Current status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.state.lock().status
    }

    /// Terminal error, set only when the session failed.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.inner.state.lock().error.clone()
    }

    /// Number of events written to the sink so far in event framing.
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::Acquire)
    }

    fn closed_error(&self, status: Status) -> Error {
        Error::ClosedSession {
            id: self.inner.id,
            status,
        }
    }

    /// Render `item` for the wire. In event framing it becomes event number `seq`.
    fn encode(&self, item: StreamItem, seq: u64) -> Result<Bytes> {
        match self.inner.framing {
            Framing::Chunked => Ok(item.into_bytes()),
            Framing::Event => {
                let (data, tag) = item.into_parts();
                let mut event = SseEvent::default()
                    .text(String::from_utf8_lossy(&data))
                    .id(seq.to_string());
                if let Some(tag) = tag {
                    if !is_single_line(&tag) {
                        return Err(Error::producer("event name contains a line break"));
                    }
                    event = event.name(tag);
                }
                Ok(Bytes::from(event.to_string()))
            }
        }
    }

    /// Write `item` to the sink and flush it.
    ///
    /// Fails with [`Error::ClosedSession`] without touching the sink when the session is
    /// not open, and with [`Error::Emit`] when the transport rejects the write. In event
    /// framing an item whose tag holds a line break is rejected with [`Error::Producer`]
    /// before anything is written.
    pub async fn emit(&self, item: StreamItem) -> Result<()> {
        let status = self.status();
        if status.is_terminal() {
            return Err(self.closed_error(status));
        }
        let mut guard = self.inner.sink.lock().await;
        // a terminal call may have won the race while we waited for the sink
        let status = self.status();
        let Some(sink) = guard.as_mut().filter(|_| !status.is_terminal()) else {
            return Err(self.closed_error(status));
        };
        // the sink lock serializes emits, so the next number is stable until stored
        let seq = self.inner.sequence.load(Ordering::Acquire) + 1;
        let bytes = self.encode(item, seq)?;
        tracing::trace!(session = %self.inner.id, len = bytes.len(), "emit item");
        sink.write(bytes).await.map_err(Error::emit)?;
        if self.inner.framing == Framing::Event {
            self.inner.sequence.store(seq, Ordering::Release);
        }
        sink.flush().await.map_err(Error::emit)
    }

    /// Move the session from `Open` to `status`. Returns `false` if it already ended.
    fn transition(&self, status: Status, error: Option<Error>) -> bool {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.error = error;
        true
    }

    /// Mark the session as completed, then flush and release the sink.
    ///
    /// Every emitted item has already been flushed, so the final flush is best effort: a
    /// failure is logged and the session still completes without an error.
    ///
    /// Does nothing if the session already ended. Returns whether this call ended it.
    pub async fn complete(&self) -> bool {
        if !self.transition(Status::Completed, None) {
            tracing::trace!(session = %self.inner.id, "complete on ended session ignored");
            return false;
        }
        let sink = self.inner.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.flush().await {
                tracing::warn!(session = %self.inner.id, error = %e, "final flush failed");
            }
            sink.close().await;
        }
        tracing::debug!(session = %self.inner.id, "session completed");
        true
    }

    /// Mark the session as failed with `error`, then abort and release the sink.
    ///
    /// Does nothing if the session already ended. Returns whether this call ended it.
    pub async fn fail(&self, error: Error) -> bool {
        if !self.transition(Status::Failed, Some(error.clone())) {
            tracing::trace!(session = %self.inner.id, "fail on ended session ignored");
            return false;
        }
        let sink = self.inner.sink.lock().await.take();
        if let Some(mut sink) = sink {
            sink.abort(&error).await;
        }
        tracing::warn!(session = %self.inner.id, error = %error, "session failed");
        true
    }
}
