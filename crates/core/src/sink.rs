//! Transport sinks.
//!
//! A [`Sink`] is the open output a session writes to. The transport layer owns the other
//! end; for HTTP responses that is a [`BodyReceiver`] polled by the response body.
use std::fmt::{self, Debug, Formatter};
use std::io::{Error as IoError, Result as IoResult};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_channel::mpsc;
use futures_util::stream::Stream;

use crate::{Error, async_trait};

/// The write side of a transport connection.
///
/// A sink is used by one writer at a time. [`close`](Sink::close) and
/// [`abort`](Sink::abort) are called at most once, when the owning session ends.
#[async_trait]
pub trait Sink: Send + 'static {
    /// Write one chunk. Waits until the transport can accept it.
    async fn write(&mut self, chunk: Bytes) -> IoResult<()>;

    /// Push written data towards the peer.
    async fn flush(&mut self) -> IoResult<()>;

    /// Close the sink after a normal end of stream.
    async fn close(&mut self);

    /// Close the sink after the stream failed with `error`.
    ///
    /// By default this is a normal close.
    async fn abort(&mut self, error: &Error) {
        let _ = error;
        self.close().await;
    }

    /// Returns `true` if the sink can no longer accept writes.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Create a bounded body channel that holds at most one chunk in flight.
///
/// The [`BodySender`] is a [`Sink`]; the [`BodyReceiver`] is a [`Stream`] of chunks for the
/// transport to forward.
pub fn body_channel() -> (BodySender, BodyReceiver) {
    let (data_tx, data_rx) = mpsc::channel(0);
    (BodySender { data_tx }, BodyReceiver { data_rx })
}

/// A sender half created through [`body_channel`].
///
/// Useful when wanting to stream chunks from another task.
///
/// ## Body Closing
///
/// The body is closed normally when the sender is closed or dropped. To end the body
/// abnormally, call [`BodySender::send_error`] first; the receiver yields the error and the
/// transport aborts the response.
#[must_use = "BodySender does nothing unless sent on"]
pub struct BodySender {
    data_tx: mpsc::Sender<IoResult<Bytes>>,
}

impl BodySender {
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        self.data_tx
            .poll_ready(cx)
            .map_err(|e| IoError::other(format!("failed to poll ready: {e}")))
    }

    async fn ready(&mut self) -> IoResult<()> {
        futures_util::future::poll_fn(|cx| self.poll_ready(cx)).await
    }

    /// Send data on data channel when it is ready.
    pub async fn send_data(&mut self, chunk: impl Into<Bytes> + Send) -> IoResult<()> {
        self.ready().await?;
        self.data_tx
            .try_send(Ok(chunk.into()))
            .map_err(|e| IoError::other(format!("failed to send data: {e}")))
    }

    /// Send error on data channel.
    pub fn send_error(&mut self, err: IoError) {
        let _ = self
            .data_tx
            // clone so the send works even if buffer is full
            .clone()
            .try_send(Err(err));
    }

    /// Closes this channel from the sender side, preventing any new messages.
    pub fn close_channel(&mut self) {
        self.data_tx.close_channel();
    }
}

#[async_trait]
impl Sink for BodySender {
    async fn write(&mut self, chunk: Bytes) -> IoResult<()> {
        self.send_data(chunk).await
    }

    async fn flush(&mut self) -> IoResult<()> {
        // the channel holds one chunk, wait until the receiver has taken it
        self.ready().await
    }

    async fn close(&mut self) {
        self.close_channel();
    }

    async fn abort(&mut self, error: &Error) {
        self.send_error(IoError::other(error.to_string()));
        self.close_channel();
    }

    fn is_closed(&self) -> bool {
        self.data_tx.is_closed()
    }
}

impl Debug for BodySender {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySender")
            .field("closed", &self.data_tx.is_closed())
            .finish()
    }
}

/// A receiver created through [`body_channel`].
pub struct BodyReceiver {
    data_rx: mpsc::Receiver<IoResult<Bytes>>,
}

impl BodyReceiver {
    /// Stop accepting chunks, as a transport does when its peer goes away.
    pub fn close(&mut self) {
        self.data_rx.close();
    }
}

impl Stream for BodyReceiver {
    type Item = IoResult<Bytes>;

    #[inline]
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.data_rx).poll_next(cx)
    }
}

impl Debug for BodyReceiver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReceiver").finish()
    }
}
