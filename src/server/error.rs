use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors surfaced synchronously to the caller of the [`Server`](super::Server) API.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("more than one handler registered for path {0:?}")]
    DuplicateRoute(String),

    #[error("handler path {0:?} must start with '/'")]
    InvalidPath(String),

    #[error("server is already running")]
    AlreadyStarted,

    #[error("server has been stopped and cannot be started again")]
    AlreadyStopped,

    #[error("server has not been started, no bound address")]
    NotStarted,

    #[error("handlers can only be registered before the server starts")]
    RegistrationClosed,

    #[error("failed to spawn acceptor thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Failure of a single exchange inside the request adapter. Logged by the
/// worker, never returned to the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head line exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("unsupported transfer encoding {0:?}")]
    UnsupportedTransferEncoding(String),

    #[error("handler for {path} panicked: {message}")]
    HandlerPanicked { path: String, message: String },

    #[error("invalid response header {name:?}: {reason}")]
    InvalidResponseHeader { name: String, reason: &'static str },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl DispatchError {
    /// Status code answered to the client for errors raised before a
    /// handler ran, if the connection is still usable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DispatchError::Malformed(_) => Some(400),
            DispatchError::HeadTooLarge(_) => Some(431),
            DispatchError::UnsupportedTransferEncoding(_) => Some(501),
            DispatchError::HandlerPanicked { .. } => Some(500),
            DispatchError::InvalidResponseHeader { .. } => Some(500),
            DispatchError::Io(_) => None,
        }
    }
}

/// Rejection reported by an [`Executor`](super::line::Executor).
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ExecuteError {
    #[error("all worker lines are busy")]
    Saturated,

    #[error("worker line disconnected")]
    Disconnected,

    #[error("failed to spawn worker thread")]
    Spawn,
}
