//! Message bus (C6): wraps a [`ByteTransport`] with a resynchronizing
//! reader loop and a writer loop, decoupled via `tokio::mpsc` channels so
//! a stalled subscriber callback never blocks the transport.
//!
//! Grounded in `examples/redhat-performance-rusty-comms/src/ipc/tcp_socket.rs`'s
//! async read/write loop shape and in
//! `original_source/src/pyimclsts/network.py`'s `message_bus_st._event_loop`
//! (`consume_input`/`consume_output` coroutines) for the exact
//! resynchronization algorithm: peek 6 bytes, check the sync word in both
//! endiannesses, validate the CRC once the full frame has arrived, and on
//! failure drop only 2 bytes before retrying.
//!
//! **Execution mode.** The specification's "out-of-process" execution
//! mode (`pyimclsts.network.message_bus`, a forked child process talking
//! over an OS pipe) is realized here as a dedicated worker `tokio::task`
//! communicating over channels rather than a forked OS process: async
//! Rust has no safe, portable equivalent of `multiprocessing.Pipe`, and a
//! Tokio task already isolates the reader/writer loops from a stalled
//! user callback the same way the Python worker process does. This
//! crate does not distinguish the two modes at the API level — every
//! `MessageBus` is built this way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::codec::crc16_ibm;
use crate::codec::primitive::{read_u16, Endianness};
use crate::error::TransportError;
use crate::message::HEADER_LEN;
use crate::transport::ByteTransport;

const MIN_PEEK_LEN: usize = 6;
const INBOUND_CHANNEL_CAPACITY: usize = 1024;
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Handle given to subscriber callbacks for sending outgoing bytes.
/// Cloning is cheap; every clone shares the same writer queue.
#[derive(Clone)]
pub struct OutboundHandle {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    blocked: Arc<AtomicBool>,
}

impl OutboundHandle {
    /// Enqueues `bytes` for the writer loop. Silently dropped if outgoing
    /// traffic is currently blocked (see [`Self::block_outgoing`]).
    pub fn send_bytes(&self, bytes: Vec<u8>) {
        if !self.blocked.load(Ordering::Relaxed) {
            let _ = self.tx.send(bytes);
        }
    }

    /// Suppresses all outgoing traffic until [`Self::unblock_outgoing`] is
    /// called. Used by the built-in `Abort` handling to stop outbound
    /// chatter once local shutdown has been requested.
    pub fn block_outgoing(&self) {
        self.blocked.store(true, Ordering::Relaxed);
    }

    pub fn unblock_outgoing(&self) {
        self.blocked.store(false, Ordering::Relaxed);
    }
}

/// Owns a [`ByteTransport`] and exposes it as two independent queues: an
/// inbound stream of complete, CRC-validated frames, and an outbound
/// sink for bytes to write.
pub struct MessageBus {
    inbound_rx: mpsc::Receiver<Vec<u8>>,
    outbound: OutboundHandle,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl MessageBus {
    pub async fn spawn(mut transport: Box<dyn ByteTransport>, sync_word: u16) -> Result<Self, TransportError> {
        transport.open().await?;
        let transport = Arc::new(Mutex::new(transport));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(INBOUND_CHANNEL_CAPACITY);
        let blocked = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(reader_loop(transport.clone(), sync_word, inbound_tx));
        let writer_task = tokio::spawn(writer_loop(transport, outbound_rx));

        Ok(MessageBus {
            inbound_rx,
            outbound: OutboundHandle { tx: outbound_tx, blocked },
            reader_task,
            writer_task,
        })
    }

    pub fn sender(&self) -> OutboundHandle {
        self.outbound.clone()
    }

    /// Awaits the next complete frame. An empty `Vec` is the end-of-stream
    /// sentinel (the underlying transport hit EOF); `None` means the
    /// reader task has already terminated and the channel is closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound_rx.recv().await
    }

    /// Stops the reader, lets the writer drain whatever is already
    /// queued (bounded by a grace period), then returns.
    pub async fn shutdown(self) {
        self.reader_task.abort();
        drop(self.outbound);
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.writer_task).await;
    }
}

async fn fill(
    transport: &Arc<Mutex<Box<dyn ByteTransport>>>,
    buffer: &mut Vec<u8>,
    min_len: usize,
) -> Result<(), TransportError> {
    while buffer.len() < min_len {
        let chunk = {
            let mut t = transport.lock().await;
            t.read((min_len - buffer.len()).max(4096)).await?
        };
        buffer.extend(chunk);
    }
    Ok(())
}

async fn reader_loop(
    transport: Arc<Mutex<Box<dyn ByteTransport>>>,
    sync_word: u16,
    inbound_tx: mpsc::Sender<Vec<u8>>,
) {
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        if let Err(err) = fill(&transport, &mut buffer, MIN_PEEK_LEN).await {
            if matches!(err, TransportError::Eof) {
                let _ = inbound_tx.send(Vec::new()).await;
            }
            return;
        }

        let endian = if read_u16(&buffer[0..2], Endianness::Big) == sync_word {
            Some(Endianness::Big)
        } else if read_u16(&buffer[0..2], Endianness::Little) == sync_word {
            Some(Endianness::Little)
        } else {
            None
        };

        let Some(endian) = endian else {
            buffer.drain(0..2);
            continue;
        };

        let size = read_u16(&buffer[4..6], endian) as usize;
        let total = HEADER_LEN + size + 2;

        if buffer.len() < total {
            if let Err(err) = fill(&transport, &mut buffer, total).await {
                if matches!(err, TransportError::Eof) {
                    let _ = inbound_tx.send(Vec::new()).await;
                }
                return;
            }
        }

        let computed = crc16_ibm(&buffer[0..total - 2]);
        let found = read_u16(&buffer[total - 2..total], endian);

        if computed == found {
            let frame: Vec<u8> = buffer.drain(0..total).collect();
            if inbound_tx.send(frame).await.is_err() {
                return;
            }
        } else {
            buffer.drain(0..2);
        }
    }
}

async fn writer_loop(
    transport: Arc<Mutex<Box<dyn ByteTransport>>>,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = outbound_rx.recv().await {
        let mut t = transport.lock().await;
        if t.write(&bytes).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, EncodeOptions};
    use crate::schema::builtins;
    use crate::transport::FileTransport;
    use std::io::Write as _;

    #[tokio::test]
    async fn resyncs_past_garbage_prefix() {
        let catalog = builtins::catalog();
        let mut msg = catalog.instantiate("Heartbeat").unwrap();
        let frame = encode(&catalog, &mut msg, Endianness::Big, EncodeOptions::default()).unwrap();

        let mut contents = vec![0xDE, 0xAD, 0xBE, 0xEF];
        contents.extend_from_slice(&frame);

        let mut input_file = tempfile::NamedTempFile::new().unwrap();
        input_file.write_all(&contents).unwrap();

        let transport = FileTransport::new(input_file.path(), None);
        let mut bus = MessageBus::spawn(Box::new(transport), catalog.sync_word).await.unwrap();

        let received = bus.recv().await.unwrap();
        assert_eq!(received, frame);

        let eof = bus.recv().await.unwrap();
        assert!(eof.is_empty());
    }

    #[tokio::test]
    async fn drops_frame_with_bad_crc_and_resyncs() {
        let catalog = builtins::catalog();
        let mut msg = catalog.instantiate("Heartbeat").unwrap();
        let mut bad_frame = encode(&catalog, &mut msg, Endianness::Big, EncodeOptions::default()).unwrap();
        let last = bad_frame.len() - 1;
        bad_frame[last] ^= 0xFF;

        let mut good_msg = catalog.instantiate("Heartbeat").unwrap();
        let good_frame = encode(&catalog, &mut good_msg, Endianness::Big, EncodeOptions::default()).unwrap();

        let mut contents = bad_frame;
        contents.extend_from_slice(&good_frame);

        let mut input_file = tempfile::NamedTempFile::new().unwrap();
        input_file.write_all(&contents).unwrap();

        let transport = FileTransport::new(input_file.path(), None);
        let mut bus = MessageBus::spawn(Box::new(transport), catalog.sync_word).await.unwrap();

        let received = bus.recv().await.unwrap();
        assert_eq!(received, good_frame);
    }
}
