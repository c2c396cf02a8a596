//! Byte transport (C5): the narrow, non-blocking byte stream abstraction
//! the message bus reads/writes against. Grounded in `IpcTransport`
//! (`examples/redhat-performance-rusty-comms/src/ipc/mod.rs`), narrowed
//! to the two concrete transports this runtime needs (file, TCP) — the
//! teacher's UDS/shared-memory/POSIX-message-queue transports have no
//! counterpart here.

pub mod file;
pub mod tcp;

use async_trait::async_trait;

use crate::error::TransportError;

/// A duplex byte stream. `read` may return fewer bytes than requested;
/// an `Ok(vec![])` return or [`TransportError::Eof`] both signal end of
/// stream depending on the concrete transport (file transports return
/// `Eof`; see each implementation's doc comment).
#[async_trait]
pub trait ByteTransport: Send {
    async fn open(&mut self) -> Result<(), TransportError>;
    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

pub use file::FileTransport;
pub use tcp::TcpTransport;
