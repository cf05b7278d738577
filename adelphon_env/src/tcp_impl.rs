//! Production transport: newline-framed ASCII over TCP.

use crate::error::EnvError;
use crate::link::{Acceptor, FrameReader, FrameWriter, Link};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// Upper bound on a single line; anything longer is a desynchronized peer.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

struct TcpFrameReader {
    reader: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
}

#[async_trait]
impl FrameReader for TcpFrameReader {
    async fn read_frame(&mut self) -> Result<Option<String>, EnvError> {
        self.buf.clear();
        // at most one byte past the cap, so an endless line is never buffered
        let limit = MAX_FRAME_BYTES as u64 + 1;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        } else if self.buf.len() > MAX_FRAME_BYTES {
            return Err(EnvError::invalid(format!(
                "frame exceeds {} bytes",
                MAX_FRAME_BYTES
            )));
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        String::from_utf8(std::mem::take(&mut self.buf))
            .map(Some)
            .map_err(|_| EnvError::invalid("frame is not UTF-8"))
    }
}

struct TcpFrameWriter {
    half: OwnedWriteHalf,
}

#[async_trait]
impl FrameWriter for TcpFrameWriter {
    async fn write_frame(&mut self, frame: &str) -> Result<(), EnvError> {
        if frame.contains('\n') {
            return Err(EnvError::invalid("frame contains a newline"));
        }
        let mut buf = Vec::with_capacity(frame.len() + 1);
        buf.extend_from_slice(frame.as_bytes());
        buf.push(b'\n');
        self.half.write_all(&buf).await?;
        self.half.flush().await?;
        Ok(())
    }
}

/// Wraps an established stream as a [`Link`].
pub fn link_from_stream(stream: TcpStream, label: impl Into<String>) -> Result<Link, EnvError> {
    stream.set_nodelay(true)?;
    let (read, write) = stream.into_split();
    Ok(Link::new(
        label,
        Box::new(TcpFrameReader {
            reader: BufReader::new(read),
            buf: Vec::new(),
        }),
        Box::new(TcpFrameWriter { half: write }),
    ))
}

/// Dials `addr` and returns the connected link.
pub async fn connect(addr: &str) -> Result<Link, EnvError> {
    let stream = TcpStream::connect(addr).await?;
    link_from_stream(stream, addr.to_string())
}

/// A listening socket producing one [`Link`] per inbound connection.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Binds a listener on `addr`.
    pub async fn bind(addr: &str) -> Result<Self, EnvError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Returns the bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, EnvError> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<Link, EnvError> {
        let (stream, peer) = self.listener.accept().await?;
        link_from_stream(stream, peer.to_string())
    }
}
