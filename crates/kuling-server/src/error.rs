//! Server error types.
//!
//! These cover the accept loop and connection plumbing. Command-level
//! failures never surface here; they are rendered as protocol error
//! frames and sent to the client by the command dispatcher.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] kuling_protocol::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
