//! Error taxonomy shared by the encoder, the build orchestrator and the stub reader

use std::{io, path::PathBuf};

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = BlobError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BlobError {
    /// Conflicting or invalid encoding options. Raised before any transform,
    /// temp file or subprocess work is started.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configuration file could not be read or parsed
    #[error("invalid configuration file {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    /// The source transform tool failed or could not be started
    #[error("{program} failed{}: {output}", .code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    ToolExecution {
        program: String,
        /// `None` when the process could not be spawned or was killed by a signal
        code: Option<i32>,
        /// Combined stdout and stderr of the tool, or the spawn error
        output: String,
    },

    /// A dependency source or its import statement could not be found
    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Text that looked like a decoder stub could not be decoded
    #[error("malformed stub for module '{module}': {message}")]
    MalformedStub { module: String, message: String },
}

impl BlobError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(module: &str, message: impl Into<String>) -> Self {
        Self::MalformedStub {
            module: module.to_owned(),
            message: message.into(),
        }
    }

    /// Whether this error stems from how the tool was invoked rather than
    /// from the inputs it processed
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Config { .. })
    }
}
