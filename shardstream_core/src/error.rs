use std::path::PathBuf;

use thiserror::Error;

/// Every failure the shard pipeline can surface.
///
/// None of these are retried internally; the caller driving a write or read
/// pass decides whether to start over.
#[derive(Error, Debug)]
pub enum Error {
    /// A codec rejected an appended value (wrong type, wrong shape, duplicate file).
    #[error("validation failed in {codec} codec: {message}")]
    Validation { codec: String, message: String },

    /// A manifest names a tag the registry does not know how to decode.
    #[error("tag '{tag}' is not a registered codec tag")]
    UnknownCodec { tag: String },

    /// The writer refuses to overwrite an existing dataset root.
    #[error("destination '{path}' already exists")]
    DestinationConflict { path: PathBuf },

    /// A catalog or storage request returned a non-success status or failed to send.
    #[error("transport error for '{url}': {message}")]
    Transport {
        url: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A shard, manifest, or codec file is missing or corrupt.
    #[error("format error at '{path}': {message}")]
    Format { path: PathBuf, message: String },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(codec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            codec: codec.into(),
            message: message.into(),
        }
    }

    pub fn unknown_codec(tag: impl Into<String>) -> Self {
        Self::UnknownCodec { tag: tag.into() }
    }

    pub fn destination_conflict(path: impl Into<PathBuf>) -> Self {
        Self::DestinationConflict { path: path.into() }
    }

    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source(
        url: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Attach a path to a bare `std::io::Result`.
pub trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
