//! File passthrough.
//!
//! A file is streamed as a plain producer whose items are successive chunks of the file.
//! [`ChunkedFile`] reads the chunks on the blocking pool so a large file never sits in
//! memory as a whole.
//!
//! # Example
//!
//! ```no_run
//! use rivulet_core::prelude::*;
//!
//! # async fn run(sender: rivulet_core::BodySender) -> rivulet_core::Result<()> {
//! let emitter = Emitter::new();
//! let session = emitter.open(sender, Mode::Synchronous)?;
//! let producer = file_producer("static/text.txt", 64 * 1024).await?;
//! emitter.run_producer(&session, producer).await?;
//! # Ok(())
//! # }
//! ```
use std::cmp;
use std::fmt::{self, Debug, Formatter};
use std::io::{self, Error as IoError, ErrorKind, Read, Result as IoResult, Seek};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::stream::Stream;

use crate::Producer;

/// Default size of one chunk.
pub const DEFAULT_BUFFER_SIZE: u64 = 64 * 1024;

enum ChunkedState<T> {
    /// Holding the file, ready to start the next read operation.
    File(Option<T>),
    /// Waiting for a blocking read operation to complete.
    Future(tokio::task::JoinHandle<IoResult<(T, Bytes)>>),
}

/// A streaming file reader that yields data in chunks of at most `buffer_size` bytes.
///
/// The stream ends after `total_size` bytes. A file that turns out shorter than that
/// yields an `UnexpectedEof` error.
pub struct ChunkedFile<T> {
    total_size: u64,
    read_size: u64,
    buffer_size: u64,
    offset: u64,
    state: ChunkedState<T>,
}

impl<T> ChunkedFile<T> {
    /// Create a reader over the first `total_size` bytes of `file`.
    #[must_use]
    pub fn new(file: T, total_size: u64, buffer_size: u64) -> Self {
        Self {
            total_size,
            read_size: 0,
            buffer_size: buffer_size.max(1),
            offset: 0,
            state: ChunkedState::File(Some(file)),
        }
    }
}

impl<T> Debug for ChunkedFile<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedFile")
            .field("total_size", &self.total_size)
            .field("read_size", &self.read_size)
            .field("buffer_size", &self.buffer_size)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<T> Stream for ChunkedFile<T>
where
    T: Read + Seek + Unpin + Send + 'static,
{
    type Item = IoResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.total_size == self.read_size {
            return Poll::Ready(None);
        }

        match self.state {
            ChunkedState::File(ref mut file) => {
                let Some(mut file) = file.take() else {
                    return Poll::Ready(None);
                };
                let max_bytes = cmp::min(
                    self.total_size.saturating_sub(self.read_size),
                    self.buffer_size,
                ) as usize;
                let offset = self.offset;
                let fut = tokio::task::spawn_blocking(move || {
                    let mut buf = Vec::with_capacity(max_bytes);
                    file.seek(io::SeekFrom::Start(offset))?;
                    let bytes = file.by_ref().take(max_bytes as u64).read_to_end(&mut buf)?;
                    if bytes == 0 {
                        return Err(ErrorKind::UnexpectedEof.into());
                    }
                    Ok((file, Bytes::from(buf)))
                });

                self.state = ChunkedState::Future(fut);
                self.poll_next(cx)
            }
            ChunkedState::Future(ref mut fut) => {
                let result = ready!(Pin::new(fut).poll(cx))
                    .map_err(|_| IoError::other("`ChunkedFile` block error"))
                    .and_then(|read| read);
                let (file, bytes) = match result {
                    Ok(read) => read,
                    Err(e) => {
                        // the file handle is gone with the failed read, end the stream
                        self.state = ChunkedState::File(None);
                        self.read_size = self.total_size;
                        return Poll::Ready(Some(Err(e)));
                    }
                };
                self.state = ChunkedState::File(Some(file));

                self.offset += bytes.len() as u64;
                self.read_size += bytes.len() as u64;

                Poll::Ready(Some(Ok(bytes)))
            }
        }
    }
}

/// Open the file at `path` and wrap it as a producer of `buffer_size` chunks.
pub async fn file_producer(path: impl AsRef<Path>, buffer_size: u64) -> IoResult<Producer> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await?;
    let total_size = file.metadata().await?.len();
    tracing::debug!(path = %path.display(), size = total_size, "streaming file");
    let file = file.into_std().await;
    Ok(Producer::new(ChunkedFile::new(file, total_size, buffer_size)))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use bytes::BytesMut;
    use futures_util::stream::StreamExt;

    use super::*;
    use crate::test::RecordingSink;
    use crate::{Emitter, Mode, Status};

    #[tokio::test]
    async fn test_chunk_read() {
        const SIZE: u64 = 1024 * 1024 * 5;
        let mock = Cursor::new((0..SIZE).map(|_| fastrand::u8(..)).collect::<Vec<_>>());

        let mut chunk = ChunkedFile::new(mock.clone(), SIZE, 65535);

        let mut result = BytesMut::with_capacity(SIZE as usize);

        while let Some(Ok(read_chunk)) = chunk.next().await {
            assert!(read_chunk.len() <= 65535);
            result.extend_from_slice(&read_chunk)
        }

        assert_eq!(mock.into_inner(), result)
    }

    #[tokio::test]
    async fn test_short_file_is_an_error() {
        let mock = Cursor::new(vec![1u8; 10]);
        let mut chunk = ChunkedFile::new(mock, 20, 8);
        assert_eq!(chunk.next().await.unwrap().unwrap().len(), 8);
        assert_eq!(chunk.next().await.unwrap().unwrap().len(), 2);
        let err = chunk.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert!(chunk.next().await.is_none());
    }

    #[tokio::test]
    async fn test_file_passthrough() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"line one\nline two\nline three\n").unwrap();

        let emitter = Emitter::new();
        let sink = RecordingSink::new();
        let session = emitter.open(sink.clone(), Mode::Synchronous).unwrap();
        let producer = file_producer(file.path(), 10).await.unwrap();
        emitter.run_producer(&session, producer).await.unwrap();

        assert_eq!(sink.writes().concat(), "line one\nline two\nline three\n");
        assert_eq!(sink.writes().len(), 3);
        assert_eq!(session.status(), Status::Completed);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = file_producer("does/not/exist.txt", DEFAULT_BUFFER_SIZE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
