//! Error types for the egress core.

use thiserror::Error;

/// Result type alias using [`EgressError`].
pub type Result<T> = std::result::Result<T, EgressError>;

/// Coarse classification of an [`EgressError`], reported to the session owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Naming or configuration contract violation.
    InvalidInput,
    /// Unknown codec / mime combination.
    UnsupportedFormat,
    /// The processing engine refused a construction or property call.
    EngineFailure,
    /// Lookup of an identifier with nothing registered.
    NotFound,
    /// Sink or filesystem failure.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::EngineFailure => "engine failure",
            ErrorKind::NotFound => "not found",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Main error type for egress session construction.
#[derive(Error, Debug)]
pub enum EgressError {
    /// Request violates a naming or configuration rule.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Codec or mime type the graph cannot handle.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Processing engine failure while building or mutating the graph.
    #[error("pipeline error: {0}")]
    Engine(String),

    /// Nothing registered under the given identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write or start on a sink that was already closed.
    #[error("sink closed")]
    SinkClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request document.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl EgressError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        EgressError::InvalidInput(msg.into())
    }

    pub fn unsupported(what: impl std::fmt::Display) -> Self {
        EgressError::UnsupportedFormat(what.to_string())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        EgressError::Engine(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EgressError::InvalidInput(_) | EgressError::Config(_) => ErrorKind::InvalidInput,
            EgressError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            EgressError::Engine(_) => ErrorKind::EngineFailure,
            EgressError::NotFound(_) => ErrorKind::NotFound,
            EgressError::SinkClosed | EgressError::Io(_) => ErrorKind::Io,
        }
    }
}
