use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A capability failed to initialize. Never fatal to the process: the handle
/// degrades to `Failed` and routing treats it as absent.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("failed to spawn {command}: {detail}")]
    Spawn { command: String, detail: String },

    #[error("handshake failed: {0}")]
    Connect(String),

    #[error("did not become ready within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("shutdown failed: {0}")]
    Shutdown(String),

    #[error("did not stop within {0:?}, abandoning")]
    Timeout(Duration),
}

/// Per-invocation failures. Always recoverable at the dispatch level: the
/// delegate is treated as having produced a failure note.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("capability is not running")]
    Unavailable,

    #[error("invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("capability failed: {detail}")]
    RemoteFailure { detail: String },
}

/// Start or stop failures collected across a whole registry sweep. Callers need
/// per-capability detail for diagnostics, so the individual errors ride along.
#[derive(Debug)]
pub struct AggregateError<E> {
    pub failures: Vec<(String, E)>,
}

impl<E> AggregateError<E> {
    pub fn new() -> Self {
        AggregateError {
            failures: Vec::new(),
        }
    }

    pub fn push<S: Into<String>>(&mut self, name: S, error: E) {
        self.failures.push((name.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok` when no failures were collected, otherwise the aggregate itself.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E> Default for AggregateError<E> {
    fn default() -> Self {
        AggregateError::new()
    }
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} capability failure(s): ", self.failures.len())?;
        for (index, (name, error)) in self.failures.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{name}: {error}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for AggregateError<E> {}
