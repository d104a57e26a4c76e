//! Error types for the chat server and its command-line front end.

use std::{io, net::SocketAddr, num::ParseIntError};

use thiserror::Error;

/// Failures that stop the server before it starts serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("username '{0}' is already in use")]
    UsernameTaken(String),
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("input closed before a port number was entered")]
    InputClosed,

    #[error("'{input}' is not a valid port number")]
    InvalidPort {
        input: String,
        #[source]
        source: ParseIntError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Whether an I/O error means the peer went away, as opposed to some other
/// failure on the socket. Used to pick the log message only.
pub fn is_connection_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}
