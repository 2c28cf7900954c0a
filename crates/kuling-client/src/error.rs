//! Client error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The server replied with an error frame.
    #[error("server {kind}: {message}")]
    Server { kind: String, message: String },

    /// The server replied with a frame the command does not expect.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] kuling_protocol::ParseError),

    #[error("corrupt message data: {0}")]
    Message(#[from] kuling_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
