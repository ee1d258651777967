use std::io::Error as IoError;
use std::net::SocketAddr;
use std::path::PathBuf;

use http::StatusCode;

/// Errors raised by the rivulet server.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The configuration file could not be read.
    #[error("failed to read config `{}`: {source}", path.display())]
    ReadConfig {
        /// Path of the file.
        path: PathBuf,
        /// Underlying io error.
        source: IoError,
    },
    /// The configuration file is not valid TOML for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config `{}`: {source}", path.display())]
    ParseConfig {
        /// Path of the file.
        path: PathBuf,
        /// Parse error.
        source: toml::de::Error,
    },
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying io error.
        source: IoError,
    },
    /// A file to stream does not exist.
    #[error("file `{}` not found", .0.display())]
    FileNotFound(PathBuf),
    /// A file to stream could not be opened.
    #[error("failed to open `{}`: {source}", path.display())]
    OpenFile {
        /// Path of the file.
        path: PathBuf,
        /// Underlying io error.
        source: IoError,
    },
    /// The stream could not be started.
    #[error(transparent)]
    Stream(#[from] rivulet_core::Error),
}

impl Error {
    /// Status code sent to the client when a handler fails with this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::FileNotFound(_) => StatusCode::NOT_FOUND,
            Self::Stream(
                rivulet_core::Error::PoolShutdown
                | rivulet_core::Error::MissingWorkerPool
                | rivulet_core::Error::Cancelled,
            ) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::FileNotFound("static/none.txt".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::from(rivulet_core::Error::PoolShutdown).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::from(rivulet_core::Error::SinkUnavailable("closed".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display() {
        let err = Error::FileNotFound("static/none.txt".into());
        assert_eq!(err.to_string(), "file `static/none.txt` not found");
    }
}
