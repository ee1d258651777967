// Copyright (c) 2018-2020 Sean McArthur
// Licensed under the MIT license http://opensource.org/licenses/MIT
// port from https://github.com/seanmonstar/warp/blob/master/src/filters/sse.rs
//! Server-sent event framing.
//!
//! Sessions opened with [`Framing::Event`](crate::Framing::Event) turn every item into one
//! [`SseEvent`]. The type can also be used directly to render messages that carry a
//! comment or a retry hint.
//!
//! See also the [EventSource](https://developer.mozilla.org/en-US/docs/Web/API/EventSource) API,
//! which specifies the expected behavior of Server Sent Events.
use std::fmt::{self, Display, Formatter, Write};
use std::time::Duration;

use serde::Serialize;

/// Server-sent event data type
#[derive(Clone, Debug)]
enum DataType {
    Text(String),
    Json(String),
}

/// Server-sent event
#[derive(Default, Clone, Debug)]
pub struct SseEvent {
    name: Option<String>,
    id: Option<String>,
    data: Option<DataType>,
    comment: Option<String>,
    retry: Option<Duration>,
}

impl SseEvent {
    /// Sets Server-sent event data.
    #[inline]
    #[must_use]
    pub fn text<T: Into<String>>(mut self, data: T) -> Self {
        self.data = Some(DataType::Text(data.into()));
        self
    }

    /// Sets Server-sent event data.
    #[inline]
    pub fn json<T: Serialize>(mut self, data: T) -> Result<Self, serde_json::Error> {
        self.data = Some(DataType::Json(serde_json::to_string(&data)?));
        Ok(self)
    }

    /// Sets Server-sent event comment.
    #[inline]
    #[must_use]
    pub fn comment<T: Into<String>>(mut self, comment: T) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets Server-sent event event.
    #[inline]
    #[must_use]
    pub fn name<T: Into<String>>(mut self, event: T) -> Self {
        self.name = Some(event.into());
        self
    }

    /// Sets Server-sent event retry.
    #[inline]
    #[must_use]
    pub fn retry(mut self, duration: Duration) -> Self {
        self.retry = Some(duration);
        self
    }

    /// Sets Server-sent event id.
    #[inline]
    #[must_use]
    pub fn id<T: Into<String>>(mut self, id: T) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Returns `true` if `value` fits on one field line, i.e. holds no CR or LF.
#[inline]
pub(crate) fn is_single_line(value: &str) -> bool {
    !value.contains(['\r', '\n'])
}

/// Split `data` at every `\r\n`, `\r` or `\n`, the line ends an event stream parser knows.
fn data_lines(data: &str) -> impl Iterator<Item = &str> {
    data.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .flat_map(|line| line.split('\r'))
}

impl Display for SseEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(comment) = &self.comment {
            f.write_str(": ")?;
            comment.fmt(f)?;
            f.write_char('\n')?;
        }

        if let Some(name) = &self.name {
            f.write_str("event: ")?;
            name.fmt(f)?;
            f.write_char('\n')?;
        }

        match &self.data {
            Some(DataType::Text(data)) => {
                // a trailing line break belongs to the payload, not to an empty data line
                let data = data
                    .strip_suffix("\r\n")
                    .or_else(|| data.strip_suffix(['\r', '\n']))
                    .unwrap_or(data);
                for line in data_lines(data) {
                    f.write_str("data: ")?;
                    line.fmt(f)?;
                    f.write_char('\n')?;
                }
            }
            Some(DataType::Json(data)) => {
                f.write_str("data: ")?;
                data.fmt(f)?;
                f.write_char('\n')?;
            }
            None => {}
        }

        if let Some(id) = &self.id {
            f.write_str("id: ")?;
            id.fmt(f)?;
            f.write_char('\n')?;
        }

        if let Some(duration) = &self.retry {
            f.write_str("retry: ")?;
            duration.as_millis().fmt(f)?;
            f.write_char('\n')?;
        }

        f.write_char('\n')?;
        Ok(())
    }
}
