//! Line-oriented request/reply client.

use futures_util::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// A TCP client speaking one newline-terminated line per request and reply.
pub struct LineClient {
    framed: Framed<TcpStream, LinesCodec>,
}

impl LineClient {
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(LineClient {
            framed: Framed::new(stream, LinesCodec::new()),
        })
    }

    /// Send one request line and wait for its reply.
    pub async fn request(&mut self, line: &str) -> io::Result<String> {
        self.framed.send(line).await.map_err(into_io)?;
        self.recv()
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))
    }

    /// Write bytes straight to the socket, bypassing line encoding.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    /// Receive the next reply line; `None` when the server closed the
    /// connection.
    pub async fn recv(&mut self) -> io::Result<Option<String>> {
        match timeout(REPLY_TIMEOUT, self.framed.next()).await {
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "no reply")),
            Ok(None) => Ok(None),
            Ok(Some(line)) => line.map(Some).map_err(into_io),
        }
    }
}

fn into_io(err: LinesCodecError) -> io::Error {
    match err {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "reply line too long")
        }
    }
}
