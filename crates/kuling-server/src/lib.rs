//! Kuling TCP server.
//!
//! Exposes the log store and consumer-group broker over the RESP-style
//! wire protocol: an accept loop, a task per connection, and a command
//! table (`PING`, `CREATE`, `LIST`, `DESCRIBE`, `DELETE`, `PUT`, `GET`,
//! `ITERS`, `ITER_COMMIT`).

pub mod commands;
pub mod connection;
pub mod error;
pub mod server;

pub use error::{Error, Result};
pub use server::{BoundServer, Server, ServerConfig, ServerState};
