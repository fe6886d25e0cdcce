use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort processing of a single document.
///
/// Problems with individual detections never show up here; the parser and
/// sequencer drop those lines instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read image {}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("OCR engine failed on {}: {message}", path.display())]
    Engine {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Path of the image or file the failure relates to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Image { path, .. }
            | Self::Engine { path, .. }
            | Self::Io { path, .. }
            | Self::Json { path, .. } => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
