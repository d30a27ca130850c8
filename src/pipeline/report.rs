//! Asynchronous error channel towards the session owner
//!
//! Failures while mutating a running graph originate in event callbacks, so
//! they are not returned to anyone. They are pushed here instead, and the
//! session layer decides whether to keep going in a degraded state.

use log::error;
use tokio::sync::mpsc;

use crate::errors::{EgressError, ErrorKind};

/// Error reported by a live graph mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::UnboundedSender<PipelineError>,
}

impl ErrorReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, err: &EgressError) {
        error!("pipeline error: {}", err);
        let report = PipelineError {
            kind: err.kind(),
            message: err.to_string(),
        };
        // the owner may already be gone during teardown
        let _ = self.tx.send(report);
    }
}
