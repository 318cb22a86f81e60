//! Frame transport -- one TCP stream, whole frames in and out.
//!
//! Replies are matched by command id. NOP frames may arrive at any time and
//! are skipped; any other unexpected id is a protocol violation.

use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use mfsprobe_protocol::commands::command_name;
use mfsprobe_protocol::{Frame, FrameCodec, ProtocolError, ANTOAN_NOP};

const READ_CHUNK: usize = 8 * 1024;

fn timed_out(what: &str) -> ProtocolError {
    ProtocolError::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} timed out"),
    ))
}

pub struct FrameTransport {
    stream: TcpStream,
    codec: FrameCodec,
    read_buf: BytesMut,
    io_timeout: Duration,
}

impl FrameTransport {
    /// Open a TCP connection within `connect_timeout`.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, ProtocolError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| timed_out("connect"))??;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream, io_timeout))
    }

    pub fn from_stream(stream: TcpStream, io_timeout: Duration) -> Self {
        Self {
            stream,
            codec: FrameCodec,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            io_timeout,
        }
    }

    /// Write one frame: 8-byte header then payload (may be empty).
    pub async fn send(&mut self, command: u32, payload: Bytes) -> Result<(), ProtocolError> {
        let mut buf = BytesMut::new();
        self.codec.encode(Frame::new(command, payload), &mut buf)?;
        trace!(command = command_name(command), len = buf.len(), "send");
        tokio::time::timeout(self.io_timeout, self.stream.write_all(&buf))
            .await
            .map_err(|_| timed_out("write"))??;
        Ok(())
    }

    /// Read frames until one carries `expected`. NOPs are dropped.
    pub async fn receive_matching(&mut self, expected: u32) -> Result<Frame, ProtocolError> {
        loop {
            while let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                if frame.command == ANTOAN_NOP {
                    debug!("nop skipped");
                    continue;
                }
                if frame.command == expected {
                    trace!(command = command_name(expected), len = frame.len(), "recv");
                    return Ok(frame);
                }
                return Err(ProtocolError::UnexpectedCommand {
                    expected,
                    got: frame.command,
                });
            }

            self.read_buf.reserve(READ_CHUNK);
            let n = tokio::time::timeout(self.io_timeout, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| timed_out("read"))??;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
        }
    }

    /// One request/reply exchange. Returns the reply payload.
    pub async fn exchange(
        &mut self,
        cmd_out: u32,
        cmd_in: u32,
        payload: Bytes,
    ) -> Result<Bytes, ProtocolError> {
        self.send(cmd_out, payload).await?;
        Ok(self.receive_matching(cmd_in).await?.payload)
    }

    /// Best-effort close; errors from the close itself are ignored.
    pub async fn shutdown(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
