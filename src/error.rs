//! Error kinds surfaced by the pipeline stages.
//!
//! Every error is delivered through the completion channel of the operation
//! that triggered it; nothing here is meant to cross a worker thread as a panic.

use std::fmt;

/// Error raised by a pipeline stage.
#[derive(Debug)]
pub enum PipelineError {
    /// The byte stream could not be fetched (connectivity, timeout, bad status).
    Transport { message: String },

    /// The durable target could not be opened, written, or reset.
    Io {
        context: String,
        source: std::io::Error,
    },

    /// A persisted record could not be decoded with the configured encoding.
    Decode { offset: u64 },

    /// An operation was invoked after the component was finished or closed.
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn transport(message: impl Into<String>) -> Self {
        PipelineError::Transport {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        PipelineError::InvalidState { operation, state }
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transport { .. } => "transport",
            PipelineError::Io { .. } => "io",
            PipelineError::Decode { .. } => "decode",
            PipelineError::InvalidState { .. } => "invalid-state",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Transport { message } => write!(f, "transport error: {}", message),
            PipelineError::Io { context, source } => write!(f, "{}: {}", context, source),
            PipelineError::Decode { offset } => {
                write!(f, "record at offset {} cannot be decoded", offset)
            }
            PipelineError::InvalidState { operation, state } => {
                write!(f, "cannot {} after the {}", operation, state)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::transport(err.to_string())
    }
}
