//! The Kuling client.
//!
//! One TCP connection, one typed method per server command. Requests go
//! out as arrays of bulk strings; responses come back as single frames
//! (GET's bulk payload is decoded into [`Message`]s).
//!
//! The client is deliberately unpooled: a connection is cheap and the
//! server keeps no per-connection state, so callers that want parallelism
//! open more clients.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use kuling_core::Message;
use kuling_protocol::{encode_frame, parse_frame, Frame};

use crate::error::{Error, Result};

/// A connection to a Kuling server.
pub struct Client {
    stream: BufWriter<TcpStream>,
    read_buf: BytesMut,
}

impl Client {
    /// Connect to a server address like `"127.0.0.1:7777"`.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Client> {
        let stream = TcpStream::connect(addr).await?;
        debug!(peer = ?stream.peer_addr().ok(), "connected");
        Ok(Client {
            stream: BufWriter::new(stream),
            read_buf: BytesMut::with_capacity(4 * 1024),
        })
    }

    /// Health check. The server answers `+PONG`.
    pub async fn ping(&mut self) -> Result<()> {
        let reply = self.round_trip(Frame::command(["PING"])).await?;
        self.expect_status(reply, "PONG")
    }

    /// Create a topic with a fixed number of shards.
    pub async fn create(&mut self, topic: &str, num_shards: u32) -> Result<()> {
        let reply = self
            .round_trip(Frame::command([
                Bytes::from_static(b"CREATE"),
                Bytes::from(topic.to_string()),
                Bytes::from(num_shards.to_string()),
            ]))
            .await?;
        self.expect_status(reply, "OK")
    }

    /// List topic names.
    pub async fn list(&mut self) -> Result<Vec<String>> {
        let reply = self.round_trip(Frame::command(["LIST"])).await?;
        self.expect_string_array(reply)
    }

    /// Shard count of a topic.
    pub async fn describe(&mut self, topic: &str) -> Result<u32> {
        let reply = self
            .round_trip(Frame::command([
                Bytes::from_static(b"DESCRIBE"),
                Bytes::from(topic.to_string()),
            ]))
            .await?;
        match reply {
            Frame::Integer(n) if n >= 0 => Ok(n as u32),
            other => Err(self.unexpected(other)),
        }
    }

    /// Delete a topic and all its data.
    pub async fn delete(&mut self, topic: &str) -> Result<()> {
        let reply = self
            .round_trip(Frame::command([
                Bytes::from_static(b"DELETE"),
                Bytes::from(topic.to_string()),
            ]))
            .await?;
        self.expect_status(reply, "OK")
    }

    /// Append one keyed message to a topic shard.
    pub async fn put(
        &mut self,
        topic: &str,
        shard: &str,
        key: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let reply = self
            .round_trip(Frame::command([
                Bytes::from_static(b"PUT"),
                Bytes::from(topic.to_string()),
                Bytes::from(shard.to_string()),
                key.into(),
                payload.into(),
            ]))
            .await?;
        self.expect_status(reply, "OK")
    }

    /// Fetch up to `max` messages from a shard starting at `start_seq`.
    pub async fn get(
        &mut self,
        topic: &str,
        shard: &str,
        start_seq: i64,
        max: i64,
    ) -> Result<Vec<Message>> {
        let raw = self.get_raw(topic, shard, start_seq, max).await?;
        Ok(Message::decode_all(raw)?)
    }

    /// Fetch the raw concatenated message bytes without decoding.
    pub async fn get_raw(
        &mut self,
        topic: &str,
        shard: &str,
        start_seq: i64,
        max: i64,
    ) -> Result<Bytes> {
        let reply = self
            .round_trip(Frame::command([
                Bytes::from_static(b"GET"),
                Bytes::from(topic.to_string()),
                Bytes::from(shard.to_string()),
                Bytes::from(start_seq.to_string()),
                Bytes::from(max.to_string()),
            ]))
            .await?;
        match reply {
            Frame::Bulk(Some(data)) => Ok(data),
            Frame::Bulk(None) => Ok(Bytes::new()),
            other => Err(self.unexpected(other)),
        }
    }

    /// Join `client` to a consumer group and fetch its iterators for a
    /// topic.
    pub async fn iters(
        &mut self,
        group: &str,
        client: &str,
        topic: &str,
    ) -> Result<Vec<String>> {
        let reply = self
            .round_trip(Frame::command([
                Bytes::from_static(b"ITERS"),
                Bytes::from(group.to_string()),
                Bytes::from(client.to_string()),
                Bytes::from(topic.to_string()),
            ]))
            .await?;
        self.expect_string_array(reply)
    }

    /// Commit an iterator offset.
    pub async fn commit(&mut self, iter: &str, offset: i64) -> Result<()> {
        let reply = self
            .round_trip(Frame::command([
                Bytes::from_static(b"ITER_COMMIT"),
                Bytes::from(iter.to_string()),
                Bytes::from(offset.to_string()),
            ]))
            .await?;
        self.expect_status(reply, "OK")
    }

    // ---------------------------------------------------------------
    // Wire plumbing
    // ---------------------------------------------------------------

    async fn round_trip(&mut self, request: Frame) -> Result<Frame> {
        let mut buf = BytesMut::new();
        encode_frame(&request, &mut buf);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        self.read_frame().await
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = parse_frame(&mut self.read_buf)? {
                // Server errors surface as typed results, not frames.
                if let Some((kind, message)) = frame.error_parts() {
                    return Err(Error::Server {
                        kind: kind.to_string(),
                        message: message.to_string(),
                    });
                }
                return Ok(frame);
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    fn expect_status(&self, frame: Frame, want: &str) -> Result<()> {
        match frame {
            Frame::Simple(status) if status == want => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }

    fn expect_string_array(&self, frame: Frame) -> Result<Vec<String>> {
        let items = match frame {
            Frame::Array(Some(items)) => items,
            other => return Err(self.unexpected(other)),
        };
        items
            .into_iter()
            .map(|item| match item.as_str() {
                Some(s) => Ok(s.to_string()),
                None => Err(self.unexpected(item.clone())),
            })
            .collect()
    }

    fn unexpected(&self, frame: Frame) -> Error {
        Error::UnexpectedResponse(format!("{frame:?}"))
    }
}
