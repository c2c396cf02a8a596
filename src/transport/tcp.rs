//! TCP byte transport, grounded in
//! `examples/redhat-performance-rusty-comms/src/ipc/tcp_socket.rs`'s
//! socket tuning (`TCP_NODELAY`, buffer sizing via `socket2`) and
//! async read/write loop shape, narrowed to the client-connect case:
//! per the specification, a console connects outward to a vehicle's
//! TCP endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::ByteTransport;
use crate::error::TransportError;

const RECV_BUFFER_BYTES: usize = 256 * 1024;
const SEND_BUFFER_BYTES: usize = 256 * 1024;

pub struct TcpTransport {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        TcpTransport { addr, stream: None }
    }

    fn tune(stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(true)?;
        let sock_ref = SockRef::from(stream);
        sock_ref.set_recv_buffer_size(RECV_BUFFER_BYTES)?;
        sock_ref.set_send_buffer_size(SEND_BUFFER_BYTES)?;
        sock_ref.set_tcp_keepalive(&TcpKeepalive::new().with_time(Duration::from_secs(30)))?;
        Ok(())
    }
}

#[async_trait]
impl ByteTransport for TcpTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let stream = TcpStream::connect(self.addr).await?;
        Self::tune(&stream)?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().expect("transport not open");
        let mut buf = vec![0u8; max_len.max(1)];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(TransportError::Eof);
        }
        buf.truncate(n);
        Ok(buf)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().expect("transport not open");
        stream.write_all(bytes).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_and_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut transport = TcpTransport::new(addr);
        transport.open().await.unwrap();
        transport.write(b"hello").await.unwrap();
        let echoed = transport.read(5).await.unwrap();
        assert_eq!(echoed, b"hello");

        server.await.unwrap();
    }
}
