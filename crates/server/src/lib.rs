//! HTTP front end for rivulet.
//!
//! Serves four demonstration endpoints on top of [`rivulet_core`]: a synchronous chunked
//! text stream, an asynchronous one produced on a worker pool, the same as server-sent
//! events, and a file passthrough.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod body;
pub mod config;
mod error;
mod handlers;
pub mod server;
mod service;

pub use rivulet_core as core;

pub use self::body::ResBody;
pub use self::config::{ListenConfig, PoolSection, ServerConfig, StreamsConfig};
pub use self::error::Error;
pub use self::server::Server;
pub use self::service::{HyperHandler, ResponseFuture, Service};
