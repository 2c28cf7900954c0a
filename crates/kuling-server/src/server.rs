//! TCP server.
//!
//! One accept loop, one spawned task per connection. Each task reads a
//! request frame, dispatches it, writes the response, and loops until the
//! client disconnects or a protocol error poisons the stream. Shutdown is
//! cooperative: `run_until` stops accepting when the shutdown channel
//! fires; in-flight connections finish their current request.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};

use kuling_broker::Broker;
use kuling_protocol::Frame;
use kuling_storage::LogStore;

use crate::commands::{dispatch, Request};
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7777".to_string(),
        }
    }
}

/// Shared state handed to every connection.
pub struct ServerState {
    pub logs: Arc<LogStore>,
    pub broker: Arc<Broker>,
}

/// The Kuling TCP server.
pub struct Server {
    config: ServerConfig,
    state: Arc<ServerState>,
}

impl Server {
    pub fn new(config: ServerConfig, logs: Arc<LogStore>, broker: Arc<Broker>) -> Server {
        Server {
            config,
            state: Arc::new(ServerState { logs, broker }),
        }
    }

    /// Bind the listener without starting the accept loop, so callers can
    /// learn the bound port (`:0` binds) before running.
    pub async fn bind(self) -> Result<BoundServer> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "kuling server listening");
        Ok(BoundServer {
            listener,
            state: self.state,
        })
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn run_until(self, shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<()> {
        let bound = self.bind().await?;
        bound.run_until(shutdown).await
    }
}

/// A server whose listener is bound.
pub struct BoundServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl BoundServer {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run_until(self, shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let state = self.state.clone();
                            tokio::spawn(async move {
                                match handle_connection(stream, addr, state).await {
                                    Ok(()) | Err(Error::ConnectionClosed) => {
                                        debug!(%addr, "connection closed");
                                    }
                                    Err(err) => {
                                        warn!(%addr, error = %err, "connection error");
                                    }
                                }
                            });
                        }
                        Err(err) => {
                            error!(error = %err, "accept failed");
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("kuling server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        let (_tx, rx) = tokio::sync::oneshot::channel();
        self.run_until(rx).await
    }
}

/// Serve one client connection.
#[instrument(skip(stream, state), fields(client = %addr))]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<()> {
    debug!("new connection");
    let mut conn = Connection::new(stream);

    loop {
        let frame = match conn.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(Error::Protocol(parse)) => {
                // One error frame, then drop the connection: after a framing
                // error the byte stream can no longer be trusted.
                warn!(error = %parse, "protocol error");
                let _ = conn
                    .write_frame(&Frame::error("PROTOCOL", parse.to_string()))
                    .await;
                return Err(Error::Protocol(parse));
            }
            Err(err) => return Err(err),
        };

        let request = match Request::from_frame(frame) {
            Ok(request) => request,
            Err(error_frame) => {
                conn.write_frame(&error_frame).await?;
                continue;
            }
        };

        // A panicking handler must not take down the accept loop; it costs
        // this request a generic error instead.
        match AssertUnwindSafe(dispatch(&state, &mut conn, request))
            .catch_unwind()
            .await
        {
            Ok(result) => result?,
            Err(panic) => {
                error!(?panic, "command handler panicked");
                conn.write_frame(&Frame::error("ERR", "internal error")).await?;
            }
        }
    }
}
