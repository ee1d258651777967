//! Server configuration.
//!
//! Every field has a default, so an empty file (or no file at all) gives a working
//! server. A full configuration looks like this:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! shutdown_timeout_secs = 30
//!
//! [pool]
//! max_concurrency = 256
//!
//! [streams]
//! lines = 100
//! chunked_pacing_ms = 100
//! emitter_pacing_ms = 100
//! sse_pacing_ms = 500
//! static_dir = "static"
//! file_name = "text.txt"
//! file_buffer_size = 65536
//! ```
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::Error;

/// Top level configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listener settings.
    pub server: ListenConfig,
    /// Worker pool settings.
    pub pool: PoolSection,
    /// Demonstration stream settings.
    pub streams: StreamsConfig,
}

impl ServerConfig {
    /// Load the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| Error::ParseConfig {
            path: path.to_owned(),
            source,
        })
    }

    /// Load the configuration from `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// `[server]` section.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// How long to wait for open connections and producers when shutting down.
    pub shutdown_timeout_secs: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            shutdown_timeout_secs: 30,
        }
    }
}

impl ListenConfig {
    /// Shutdown timeout as a `Duration`.
    #[inline]
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// `[pool]` section.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSection {
    /// Maximum number of producers running at once, unlimited when absent.
    pub max_concurrency: Option<usize>,
}

impl PoolSection {
    /// Convert into the core pool configuration.
    #[must_use]
    pub fn to_pool_config(&self) -> rivulet_core::PoolConfig {
        match self.max_concurrency {
            Some(max) => rivulet_core::PoolConfig::new().max_concurrency(max),
            None => rivulet_core::PoolConfig::new(),
        }
    }
}

/// `[streams]` section.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StreamsConfig {
    /// Number of lines each generated stream sends.
    pub lines: usize,
    /// Pacing of `/stream`, in milliseconds.
    pub chunked_pacing_ms: u64,
    /// Pacing of `/stream-v2`, in milliseconds.
    pub emitter_pacing_ms: u64,
    /// Pacing of `/stream-v3`, in milliseconds.
    pub sse_pacing_ms: u64,
    /// Directory holding the file served by `/file-stream`.
    pub static_dir: PathBuf,
    /// Name of the file served by `/file-stream`.
    pub file_name: String,
    /// Chunk size used when streaming the file.
    pub file_buffer_size: u64,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            lines: 100,
            chunked_pacing_ms: 100,
            emitter_pacing_ms: 100,
            sse_pacing_ms: 500,
            static_dir: PathBuf::from("static"),
            file_name: "text.txt".to_owned(),
            file_buffer_size: rivulet_core::fs::DEFAULT_BUFFER_SIZE,
        }
    }
}

impl StreamsConfig {
    /// Path of the file served by `/file-stream`.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.static_dir.join(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.streams.lines, 100);
        assert_eq!(config.streams.sse_pacing_ms, 500);
        assert_eq!(config.streams.file_path(), Path::new("static/text.txt"));
        assert_eq!(config.pool.max_concurrency, None);
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind = \"0.0.0.0:9000\"\n\n[streams]\nlines = 5\nsse_pacing_ms = 0"
        )
        .unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.streams.lines, 5);
        assert_eq!(config.streams.sse_pacing_ms, 0);
        assert_eq!(config.streams.chunked_pacing_ms, 100);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[streams]\nline = 5").unwrap();
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::ParseConfig { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::from_file("does/not/exist.toml").unwrap_err();
        assert!(matches!(err, Error::ReadConfig { .. }));
    }
}
