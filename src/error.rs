use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse classification of a [`ResourceError`], used by callers that only care which family of
/// failure happened (bad data, missing entry, filesystem, configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Lookup,
    Io,
    Config,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("malformed {kind} data: {message}")]
    Format { kind: &'static str, message: String },

    #[error("frame '{frame}' not found in sheet '{sheet}'")]
    FrameNotFound { frame: String, sheet: String },

    #[error("resource '{0}' not found")]
    ResourceNotFound(String),

    #[error("empty sheet")]
    EmptySheet,

    #[error("unknown resource filter '{0}'")]
    UnknownFilter(String),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode image '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{0}")]
    Config(String),
}

impl ResourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResourceError::Format { .. } => ErrorKind::Format,
            ResourceError::FrameNotFound { .. }
            | ResourceError::ResourceNotFound(_)
            | ResourceError::EmptySheet
            | ResourceError::UnknownFilter(_) => ErrorKind::Lookup,
            ResourceError::Io { .. } | ResourceError::Decode { .. } => ErrorKind::Io,
            ResourceError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn format(kind: &'static str, message: impl Into<String>) -> Self {
        ResourceError::Format { kind, message: message.into() }
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        ResourceError::Io { path: path.as_ref().to_path_buf(), source }
    }
}

pub type Result<T, E = ResourceError> = std::result::Result<T, E>;
