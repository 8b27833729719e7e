//! Crate-wide error type.
//!
//! Every failure that can cross a task boundary is an [`Error`]. The type is
//! `Clone` so a pipe can record the reason it was torn down and hand the same
//! reason to every reader and writer that touches it afterwards.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::net::address::Destination;

/// Direction of a relay copy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to destination.
    Uplink,
    /// Destination to client.
    Downlink,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Uplink => "uplink",
            Direction::Downlink => "downlink",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Uplink => write!(f, "request"),
            Direction::Downlink => write!(f, "response"),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),

    /// The bound cancellation token fired (caller cancelled or idle timeout).
    #[error("context cancelled")]
    Cancelled,

    #[error("pipe closed")]
    PipeClosed,

    #[error("failed to dispatch request to {destination}: {reason}")]
    Dispatch {
        destination: Destination,
        reason: String,
    },

    #[error("failed to transport {direction}: {source}")]
    Transport {
        direction: Direction,
        #[source]
        source: Box<Error>,
    },

    #[error("connection ends: {0}")]
    ConnectionEnds(#[source] Box<Error>),

    #[error("unable to get destination")]
    NoDestination,

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("configuration error: {0}")]
    Config(String),

    /// A task spawned for parallel execution panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl Error {
    pub fn transport(direction: Direction, source: Error) -> Self {
        Error::Transport {
            direction,
            source: Box::new(source),
        }
    }

    /// Walk through `Transport` and `ConnectionEnds` wrappers to the cause.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Transport { source, .. } => source.root_cause(),
            Error::ConnectionEnds(source) => source.root_cause(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
