// Transport boundary
// The connection handle owns a stream-oriented outbound connection through
// this seam; the concrete transport is external to the pipeline. Tests plug
// in in-memory implementations.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// One established stream-oriented connection
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Write one encoded frame to the peer.
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Read the next run of bytes from the peer.
    ///
    /// Returns `Ok(None)` when the peer closed the connection. Delimiting
    /// frames out of the byte stream is the framing stage's job, not the
    /// transport's.
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>>;

    /// Shut the connection down. Idempotent.
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Establishes transport connections to peers
#[async_trait::async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn Transport>>;
}

/// Plain TCP transport
pub struct TcpTransport {
    stream: TcpStream,
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await
    }

    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = [0u8; 4096];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&buf[..n])))
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        // An already-closed stream is fine here
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// TCP connector with a connect timeout
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait::async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn Transport>> {
        let address = format!("{}:{}", host, port);
        debug!("Connecting to {}", address);

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", address),
                )
            })??;

        Ok(Box::new(TcpTransport { stream }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let connector = TcpConnector::new(Duration::from_secs(5));
        let mut transport = connector.connect("127.0.0.1", port).await.unwrap();

        transport.write_frame(b"ping").await.unwrap();
        let echoed = transport.read_chunk().await.unwrap().unwrap();
        assert_eq!(&echoed[..], b"ping");

        transport.shutdown().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening
        let connector = TcpConnector::new(Duration::from_millis(500));
        assert!(connector.connect("127.0.0.1", 1).await.is_err());
    }
}
