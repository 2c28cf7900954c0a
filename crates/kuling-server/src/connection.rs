//! Connection handling.
//!
//! Buffered I/O for one client connection: frames are parsed out of a read
//! buffer as bytes arrive, responses are written through a `BufWriter`.
//! The GET path bypasses frame encoding and streams segment bytes straight
//! into the writer (see [`Connection::sink`]).

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use kuling_protocol::{encode_frame, parse_frame, Frame};

use crate::error::{Error, Result};

const READ_BUF_SIZE: usize = 4 * 1024;

/// One client connection.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    read_buf: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufWriter::new(stream),
            read_buf: BytesMut::with_capacity(READ_BUF_SIZE),
        }
    }

    /// Read one frame.
    ///
    /// `Ok(Some(frame))` on success, `Ok(None)` on a clean disconnect
    /// between frames. A disconnect mid-frame is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = parse_frame(&mut self.read_buf)? {
                return Ok(Some(frame));
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Encode and send one frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Direct access to the buffered writer, for streaming raw bytes.
    /// The caller is responsible for flushing.
    pub fn sink(&mut self) -> &mut BufWriter<TcpStream> {
        &mut self.stream
    }

    /// Flush anything buffered in the writer.
    pub async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;
        Ok(())
    }
}
