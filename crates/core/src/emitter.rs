//! Stream emitter.
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::{Framing, Mode, Status, StreamSession};
use crate::sink::Sink;
use crate::timer::{SharedTimer, Timer, TokioTimer};
use crate::{Error, Producer, Result, WorkerPool};

/// Drives producers into [`StreamSession`]s.
///
/// An emitter is cheap to clone. It carries the timer used for pacing and, for
/// asynchronous sessions, the worker pool the producers run on.
#[derive(Clone)]
pub struct Emitter {
    timer: SharedTimer,
    pool: Option<WorkerPool>,
}

impl Default for Emitter {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").field("pool", &self.pool).finish()
    }
}

impl Emitter {
    /// Create an emitter that paces with tokio timers and has no worker pool.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            timer: Arc::new(TokioTimer),
            pool: None,
        }
    }

    /// Sets the worker pool used by [`spawn_producer`](Self::spawn_producer).
    #[inline]
    #[must_use]
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Sets the timer used for pacing.
    #[inline]
    #[must_use]
    pub fn with_timer(mut self, timer: impl Timer + Send + Sync + 'static) -> Self {
        self.timer = Arc::new(timer);
        self
    }

    /// Open a chunked session over `sink`.
    ///
    /// Fails with [`Error::SinkUnavailable`] if the sink cannot accept writes.
    #[inline]
    pub fn open<S: Sink>(&self, sink: S, mode: Mode) -> Result<StreamSession<S>> {
        self.open_framed(sink, mode, Framing::Chunked)
    }

    /// Open a session over `sink` with the given framing.
    pub fn open_framed<S: Sink>(
        &self,
        sink: S,
        mode: Mode,
        framing: Framing,
    ) -> Result<StreamSession<S>> {
        if sink.is_closed() {
            return Err(Error::SinkUnavailable("sink is closed".into()));
        }
        let session = StreamSession::new(sink, mode, framing);
        tracing::debug!(
            session = %session.id(),
            mode = %mode,
            framing = ?framing,
            "session opened"
        );
        Ok(session)
    }

    /// Drive `producer` into a synchronous session on the current task.
    ///
    /// Returns once the session has ended. If the producer or the sink fails, the session
    /// is failed first and the error is returned.
    pub async fn run_producer<S: Sink>(
        &self,
        session: &StreamSession<S>,
        producer: Producer,
    ) -> Result<()> {
        if session.mode() != Mode::Synchronous {
            return Err(Error::ModeMismatch {
                expected: Mode::Synchronous,
                actual: session.mode(),
            });
        }
        drive(&self.timer, session, producer).await
    }

    /// Run `producer` for an asynchronous session on the worker pool.
    ///
    /// Returns immediately. Failures are recorded on the session; the returned handle
    /// resolves to the terminal status. When the pool shuts down or the handle is aborted
    /// first, the session fails with [`Error::Cancelled`]. A panicking producer fails the
    /// session with [`Error::Producer`].
    pub fn spawn_producer<S: Sink>(
        &self,
        session: &StreamSession<S>,
        producer: Producer,
    ) -> Result<ProducerHandle> {
        if session.mode() != Mode::Asynchronous {
            return Err(Error::ModeMismatch {
                expected: Mode::Asynchronous,
                actual: session.mode(),
            });
        }
        let pool = self.pool.as_ref().ok_or(Error::MissingWorkerPool)?;
        // cancelled by `ProducerHandle::abort` or when the pool shuts down
        let cancel = pool.shutdown_token().child_token();
        let task_cancel = cancel.clone();
        let timer = self.timer.clone();
        let session = session.clone();
        let handle = pool.spawn(async move {
            let driven = AssertUnwindSafe(drive(&timer, &session, producer)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = task_cancel.cancelled() => None,
                result = driven => Some(result),
            };
            // the drive future is gone here, so the sink is free for `fail`
            match outcome {
                None => {
                    session.fail(Error::Cancelled).await;
                }
                Some(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(session = %session.id(), panic = %message, "producer panicked");
                    session
                        .fail(Error::producer(format!("producer panicked: {message}")))
                        .await;
                }
                Some(Ok(Err(e))) => {
                    tracing::debug!(session = %session.id(), error = %e, "producer stopped");
                }
                Some(Ok(Ok(()))) => {}
            }
            session.status()
        })?;
        Ok(ProducerHandle { handle, cancel })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Pull items from `producer` and emit them in order until it ends or something fails.
async fn drive<S: Sink>(
    timer: &SharedTimer,
    session: &StreamSession<S>,
    producer: Producer,
) -> Result<()> {
    let (mut items, pacing) = producer.into_parts();
    let mut emitted = 0u64;
    loop {
        let item = match items.next().await {
            None => break,
            Some(Ok(item)) => item,
            Some(Err(e)) => {
                let error = Error::producer(e);
                session.fail(error.clone()).await;
                return Err(error);
            }
        };
        if emitted > 0 && !pacing.is_zero() {
            timer.sleep(pacing).await;
        }
        if let Err(error) = session.emit(item).await {
            session.fail(error.clone()).await;
            return Err(error);
        }
        emitted += 1;
    }
    tracing::debug!(session = %session.id(), items = emitted, "producer exhausted");
    session.complete().await;
    Ok(())
}

/// Handle of a producer running on a [`WorkerPool`].
#[derive(Debug)]
pub struct ProducerHandle {
    handle: JoinHandle<Status>,
    cancel: CancellationToken,
}

impl ProducerHandle {
    /// Wait for the producer and return the terminal status of its session.
    ///
    /// A producer that panicked or was aborted reports `Failed`.
    pub async fn join(self) -> Status {
        match self.handle.await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "producer task did not finish");
                Status::Failed
            }
        }
    }

    /// Stop the producer.
    ///
    /// Unless it already ended, the session fails with [`Error::Cancelled`] and its sink is
    /// aborted. Use [`join`](Self::join) to wait for that to happen.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` if the producer task has finished.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
