//! Response body.
use std::error::Error as StdError;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;
use hyper::body::{Body, Frame, SizeHint};
use rivulet_core::BodyReceiver;

/// Response body type.
#[non_exhaustive]
pub enum ResBody {
    /// None body.
    None,
    /// Once bytes body.
    Once(Bytes),
    /// Chunks sent by a producer running elsewhere, typically on the worker pool.
    Channel(BodyReceiver),
    /// Chunks sent by a producer that the body polls itself.
    ///
    /// The producer runs on the connection task, so the response is done when the
    /// producer is done.
    Driven {
        /// Producer future, `None` once it has finished.
        driver: Option<BoxFuture<'static, ()>>,
        /// Receiving side of the producer's sink.
        receiver: BodyReceiver,
    },
}

impl ResBody {
    /// Create a body that polls `driver` and forwards what it sends to `receiver`.
    pub fn driven<F>(driver: F, receiver: BodyReceiver) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::Driven {
            driver: Some(Box::pin(driver)),
            receiver,
        }
    }

    /// Check is that body is not set.
    #[inline]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(*self, Self::None)
    }

    /// Check is that body is streamed.
    #[inline]
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(*self, Self::Channel(_) | Self::Driven { .. })
    }
}

impl From<Bytes> for ResBody {
    #[inline]
    fn from(value: Bytes) -> Self {
        Self::Once(value)
    }
}

impl From<String> for ResBody {
    #[inline]
    fn from(value: String) -> Self {
        Self::Once(value.into())
    }
}

impl From<&'static str> for ResBody {
    #[inline]
    fn from(value: &'static str) -> Self {
        Self::Once(value.into())
    }
}

fn poll_receiver(
    receiver: &mut BodyReceiver,
    cx: &mut Context<'_>,
) -> Poll<Option<Result<Frame<Bytes>, Box<dyn StdError + Send + Sync>>>> {
    match ready!(Pin::new(receiver).poll_next(cx)) {
        Some(Ok(bytes)) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
        Some(Err(e)) => Poll::Ready(Some(Err(e.into()))),
        None => Poll::Ready(None),
    }
}

impl Body for ResBody {
    type Data = Bytes;
    type Error = Box<dyn StdError + Send + Sync>;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::None => Poll::Ready(None),
            Self::Once(bytes) => {
                if bytes.is_empty() {
                    Poll::Ready(None)
                } else {
                    let bytes = std::mem::take(bytes);
                    Poll::Ready(Some(Ok(Frame::data(bytes))))
                }
            }
            Self::Channel(receiver) => poll_receiver(receiver, cx),
            Self::Driven { driver, receiver } => {
                let finished = driver
                    .as_mut()
                    .is_some_and(|fut| fut.as_mut().poll(cx).is_ready());
                if finished {
                    *driver = None;
                }
                poll_receiver(receiver, cx)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::None => true,
            Self::Once(bytes) => bytes.is_empty(),
            Self::Channel(_) | Self::Driven { .. } => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::None => SizeHint::with_exact(0),
            Self::Once(bytes) => SizeHint::with_exact(bytes.len() as u64),
            Self::Channel(_) | Self::Driven { .. } => SizeHint::default(),
        }
    }
}

impl Debug for ResBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("ResBody::None"),
            Self::Once(bytes) => f.debug_tuple("ResBody::Once").field(bytes).finish(),
            Self::Channel(_) => f.write_str("ResBody::Channel"),
            Self::Driven { driver, .. } => f
                .debug_struct("ResBody::Driven")
                .field("running", &driver.is_some())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use rivulet_core::{Sink, body_channel};

    use super::*;

    #[tokio::test]
    async fn test_once_body() {
        let body = ResBody::from("hello");
        assert_eq!(body.size_hint().exact(), Some(5));
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, "hello");
    }

    #[tokio::test]
    async fn test_driven_body_runs_its_producer() {
        let (mut sender, receiver) = body_channel();
        let body = ResBody::driven(
            async move {
                for chunk in ["one ", "two ", "three"] {
                    sender.write(Bytes::from(chunk)).await.unwrap();
                }
                sender.close().await;
            },
            receiver,
        );
        assert!(body.is_stream());
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, "one two three");
    }

    #[tokio::test]
    async fn test_channel_error_ends_body_with_error() {
        let (mut sender, receiver) = body_channel();
        sender.send_error(std::io::Error::other("aborted"));
        sender.close_channel();
        let result = ResBody::Channel(receiver).collect().await;
        assert!(result.is_err());
    }
}
