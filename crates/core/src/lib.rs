//! The core of rivulet: drive a lazily produced sequence of items to a transport sink.
//!
//! A [`StreamSession`] is opened over a [`Sink`] by an [`Emitter`]. Items are written
//! strictly in order, one in flight at a time, and the session ends exactly once, either
//! `Completed` or `Failed`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rivulet_core::prelude::*;
//!
//! # async fn run() -> rivulet_core::Result<()> {
//! let (sender, _receiver) = body_channel();
//! let emitter = Emitter::new();
//! let session = emitter.open(sender, Mode::Synchronous)?;
//! let producer = Producer::iter((1..=3).map(|i| StreamItem::text(format!("line {i}\n"))))
//!     .pacing(Duration::from_millis(100));
//! emitter.run_producer(&session, producer).await?;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use async_trait::async_trait;
pub use bytes::Bytes;

mod emitter;
mod error;
pub mod fs;
mod item;
pub mod pool;
mod producer;
mod session;
pub mod sink;
pub mod sse;
pub mod timer;


pub use self::emitter::{Emitter, ProducerHandle};
pub use self::error::{BoxedError, Error};
pub use self::item::StreamItem;
pub use self::pool::{PoolConfig, WorkerPool};
pub use self::producer::Producer;
pub use self::session::{Framing, Mode, Status, StreamSession};
pub use self::sink::{BodyReceiver, BodySender, Sink, body_channel};

/// Result type which has `rivulet_core::Error` as its error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A list of things that are commonly imported by users of rivulet_core.
pub mod prelude {
    pub use crate::emitter::{Emitter, ProducerHandle};
    pub use crate::fs::file_producer;
    pub use crate::item::StreamItem;
    pub use crate::pool::{PoolConfig, WorkerPool};
    pub use crate::producer::Producer;
    pub use crate::session::{Framing, Mode, Status, StreamSession};
    pub use crate::sink::{Sink, body_channel};
    pub use crate::sse::SseEvent;
}
