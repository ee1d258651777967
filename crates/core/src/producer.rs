use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use crate::{BoxedError, StreamItem};

/// A lazy, finite sequence of [`StreamItem`]s plus the delay to wait between them.
///
/// A producer is consumed by one run; it cannot be restarted.
pub struct Producer {
    items: BoxStream<'static, Result<StreamItem, BoxedError>>,
    pacing: Duration,
}

impl Producer {
    /// Create a producer from a fallible stream of items.
    pub fn new<S, O, E>(items: S) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<StreamItem> + 'static,
        E: Into<BoxedError> + 'static,
    {
        Self {
            items: items
                .map_ok(Into::<StreamItem>::into)
                .map_err(Into::<BoxedError>::into)
                .boxed(),
            pacing: Duration::ZERO,
        }
    }

    /// Create a producer from an infallible iterator.
    pub fn iter<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<StreamItem>,
        I::IntoIter: Send + 'static,
    {
        Self {
            items: stream::iter(items)
                .map(|item| Ok::<_, BoxedError>(item.into()))
                .boxed(),
            pacing: Duration::ZERO,
        }
    }

    /// Sets the delay between two consecutive items. Zero disables pacing.
    #[inline]
    #[must_use]
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Delay between two consecutive items.
    #[inline]
    #[must_use]
    pub fn pacing_ref(&self) -> Duration {
        self.pacing
    }

    pub(crate) fn into_parts(self) -> (BoxStream<'static, Result<StreamItem, BoxedError>>, Duration) {
        (self.items, self.pacing)
    }
}

impl Debug for Producer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("pacing", &self.pacing)
            .finish()
    }
}
