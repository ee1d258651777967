//! The four demonstration endpoints.
//!
//! | Path           | Mode         | Framing | Producer                        |
//! |----------------|--------------|---------|---------------------------------|
//! | `/stream`      | synchronous  | chunked | `Streaming text line N`         |
//! | `/stream-v2`   | asynchronous | chunked | `N. Data: <timestamp>`          |
//! | `/stream-v3`   | asynchronous | event   | `N. Data: <timestamp>`          |
//! | `/file-stream` | synchronous  | chunked | chunks of the configured file   |
use std::io::ErrorKind;
use std::time::Duration;

use chrono::Local;
use http::header::{
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderValue, X_CONTENT_TYPE_OPTIONS,
};
use http::{Response, StatusCode};
use rivulet_core::prelude::*;
use rivulet_core::{BodyReceiver, BodySender};

use crate::{Error, ResBody, StreamsConfig};

/// Date, 24-hour time, AM/PM marker, then the zone. chrono renders `%Z` of a `Local`
/// time as a numeric offset (`+02:00`), not as a zone abbreviation like `CEST`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %p %Z";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_EVENT_STREAM: &str = "text/event-stream";
const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

pub(crate) struct Streams {
    config: StreamsConfig,
    emitter: Emitter,
}

impl Streams {
    pub(crate) fn new(config: StreamsConfig, emitter: Emitter) -> Self {
        Self { config, emitter }
    }

    /// `GET /stream`: lines written on the connection task until the last one is sent.
    pub(crate) fn stream(&self) -> Result<Response<ResBody>, Error> {
        let (sender, receiver) = body_channel();
        let session = self.emitter.open(sender, Mode::Synchronous)?;
        let producer = numbered_lines(self.config.lines)
            .pacing(Duration::from_millis(self.config.chunked_pacing_ms));
        let body = self.drive(session, producer, receiver);
        Ok(response(body, TEXT_PLAIN))
    }

    /// `GET /stream-v2`: timestamped lines produced on the worker pool.
    pub(crate) fn stream_emitter(&self) -> Result<Response<ResBody>, Error> {
        let (sender, receiver) = body_channel();
        let session = self.emitter.open(sender, Mode::Asynchronous)?;
        let producer = timestamped_lines(self.config.lines, true)
            .pacing(Duration::from_millis(self.config.emitter_pacing_ms));
        self.spawn(&session, producer)?;
        Ok(response(ResBody::Channel(receiver), TEXT_PLAIN))
    }

    /// `GET /stream-v3`: timestamped lines as server-sent events.
    pub(crate) fn stream_sse(&self) -> Result<Response<ResBody>, Error> {
        let (sender, receiver) = body_channel();
        let session = self
            .emitter
            .open_framed(sender, Mode::Asynchronous, Framing::Event)?;
        let producer = timestamped_lines(self.config.lines, false)
            .pacing(Duration::from_millis(self.config.sse_pacing_ms));
        self.spawn(&session, producer)?;
        let mut res = response(ResBody::Channel(receiver), TEXT_EVENT_STREAM);
        // Disable response body caching
        res.headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Ok(res)
    }

    /// `GET /file-stream`: the configured file as an attachment.
    pub(crate) async fn file_stream(&self) -> Result<Response<ResBody>, Error> {
        let path = self.config.file_path();
        let producer = match file_producer(&path, self.config.file_buffer_size).await {
            Ok(producer) => producer,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::FileNotFound(path)),
            Err(source) => return Err(Error::OpenFile { path, source }),
        };
        let (sender, receiver) = body_channel();
        let session = self.emitter.open(sender, Mode::Synchronous)?;
        let body = self.drive(session, producer, receiver);
        let mut res = response(body, APPLICATION_OCTET_STREAM);
        let disposition = format!("attachment; filename={}", self.config.file_name);
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            res.headers_mut().insert(CONTENT_DISPOSITION, value);
        }
        Ok(res)
    }

    fn drive(
        &self,
        session: StreamSession<BodySender>,
        producer: Producer,
        receiver: BodyReceiver,
    ) -> ResBody {
        let emitter = self.emitter.clone();
        ResBody::driven(
            async move {
                let guard = DisconnectGuard(session.clone());
                if let Err(e) = emitter.run_producer(&session, producer).await {
                    tracing::warn!(session = %session.id(), error = %e, "stream ended early");
                }
                drop(guard);
            },
            receiver,
        )
    }

    fn spawn(&self, session: &StreamSession<BodySender>, producer: Producer) -> Result<(), Error> {
        match self.emitter.spawn_producer(session, producer) {
            Ok(_handle) => Ok(()),
            Err(e) => {
                // the session was never started, release the sink right away
                let session = session.clone();
                let error = e.clone();
                tokio::spawn(async move {
                    session.fail(error).await;
                });
                Err(e.into())
            }
        }
    }
}

/// Fails a synchronous session whose body was dropped before the producer finished.
struct DisconnectGuard(StreamSession<BodySender>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.0.status().is_terminal() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let session = self.0.clone();
        handle.spawn(async move {
            let error = std::io::Error::from(ErrorKind::ConnectionAborted);
            session.fail(rivulet_core::Error::emit(error)).await;
        });
    }
}

fn response(body: ResBody, content_type: &'static str) -> Response<ResBody> {
    let mut res = Response::new(body);
    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    // keep browsers from buffering the first chunks
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    res
}

pub(crate) fn error_response(error: &Error) -> Response<ResBody> {
    let status = error.status_code();
    let mut res = response(
        ResBody::from(format!("{}\n", status.canonical_reason().unwrap_or("Error"))),
        TEXT_PLAIN,
    );
    *res.status_mut() = status;
    res
}

pub(crate) fn status_response(status: StatusCode) -> Response<ResBody> {
    let mut res = response(
        ResBody::from(format!("{}\n", status.canonical_reason().unwrap_or(""))),
        TEXT_PLAIN,
    );
    *res.status_mut() = status;
    res
}

/// `Streaming text line 1\n`, `Streaming text line 2\n`, ...
pub(crate) fn numbered_lines(lines: usize) -> Producer {
    Producer::iter((1..=lines).map(|i| format!("Streaming text line {i}\n")))
}

/// `1. Data: 2024-05-01 14:03:11 PM +02:00`, ... The timestamp is taken when the line is
/// pulled, so it reflects pacing. The zone is printed as a UTC offset, never as a named
/// abbreviation.
pub(crate) fn timestamped_lines(lines: usize, newline: bool) -> Producer {
    Producer::iter((1..=lines).map(move |i| {
        let now = Local::now().format(TIMESTAMP_FORMAT);
        if newline {
            format!("{i}. Data: {now}\n")
        } else {
            format!("{i}. Data: {now}")
        }
    }))
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use rivulet_core::test::RecordingSink;

    use super::*;

    #[tokio::test]
    async fn test_numbered_lines() {
        let emitter = Emitter::new();
        let sink = RecordingSink::new();
        let session = emitter.open(sink.clone(), Mode::Synchronous).unwrap();
        emitter
            .run_producer(&session, numbered_lines(3))
            .await
            .unwrap();
        assert_eq!(
            sink.writes(),
            vec![
                "Streaming text line 1\n",
                "Streaming text line 2\n",
                "Streaming text line 3\n"
            ]
        );
    }

    #[tokio::test]
    async fn test_timestamped_lines() {
        let emitter = Emitter::new();
        let sink = RecordingSink::new();
        let session = emitter.open(sink.clone(), Mode::Synchronous).unwrap();
        emitter
            .run_producer(&session, timestamped_lines(2, true))
            .await
            .unwrap();
        let writes = sink.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with("1. Data: "));
        assert!(writes[1].starts_with("2. Data: "));
        assert!(writes.iter().all(|line| line.ends_with('\n')));
        assert!(writes[0].contains("AM") || writes[0].contains("PM"));
        // the zone is a numeric offset such as `+02:00`
        let zone = writes[0].trim_end().rsplit(' ').next().unwrap();
        assert!(zone.starts_with('+') || zone.starts_with('-'), "{zone}");
        assert_eq!(zone.len(), 6, "{zone}");
    }

    #[tokio::test]
    async fn test_dropped_body_fails_session() {
        let streams = Streams::new(StreamsConfig::default(), Emitter::new());
        let (sender, receiver) = body_channel();
        let session = streams.emitter.open(sender, Mode::Synchronous).unwrap();
        let mut body = streams.drive(session.clone(), numbered_lines(10), receiver);
        let first = http_body_util::BodyExt::frame(&mut body).await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "Streaming text line 1\n");
        drop(body);
        tokio::task::yield_now().await;
        assert_eq!(session.status(), Status::Failed);
        assert!(session.error().unwrap().is_emit());
    }

    #[tokio::test]
    async fn test_spawn_failure_releases_sink() {
        let streams = Streams::new(StreamsConfig::default(), Emitter::new());
        let err = streams.stream_emitter().unwrap_err();
        assert!(matches!(
            err,
            Error::Stream(rivulet_core::Error::MissingWorkerPool)
        ));

        let (sender, mut receiver) = body_channel();
        let session = streams
            .emitter
            .open(sender, Mode::Asynchronous)
            .unwrap();
        assert!(streams.spawn(&session, numbered_lines(1)).is_err());
        // the sink is aborted: one error, then the end of the body
        assert!(receiver.next().await.unwrap().is_err());
        assert!(receiver.next().await.is_none());
        assert_eq!(session.status(), Status::Failed);
    }
}
