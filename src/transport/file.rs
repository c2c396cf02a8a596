//! File-based byte transport, grounded in
//! `original_source/src/pyimclsts/core.py::file_interface` (separate
//! input/output paths, `EOFError` on an empty read).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::ByteTransport;
use crate::error::TransportError;

/// Reads frames from `input`; if `output` is set, writes (appends)
/// outgoing bytes there. A console replaying a logged IMC capture
/// typically only sets `input`.
pub struct FileTransport {
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    reader: Option<File>,
    writer: Option<File>,
}

impl FileTransport {
    pub fn new(input_path: impl Into<PathBuf>, output_path: Option<PathBuf>) -> Self {
        FileTransport {
            input_path: input_path.into(),
            output_path,
            reader: None,
            writer: None,
        }
    }
}

#[async_trait]
impl ByteTransport for FileTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.reader = Some(File::open(&self.input_path).await?);
        if let Some(path) = &self.output_path {
            self.writer = Some(
                tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?,
            );
        }
        Ok(())
    }

    async fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let reader = self.reader.as_mut().expect("transport not open");
        let mut buf = vec![0u8; max_len.max(1)];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(TransportError::Eof);
        }
        buf.truncate(n);
        Ok(buf)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(bytes).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.reader = None;
        self.writer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[tokio::test]
    async fn reads_back_written_bytes() {
        let mut input_file = tempfile::NamedTempFile::new().unwrap();
        input_file.write_all(b"hello world").unwrap();

        let mut transport = FileTransport::new(input_file.path(), None);
        transport.open().await.unwrap();
        let chunk = transport.read(5).await.unwrap();
        assert_eq!(chunk, b"hello");
    }

    #[tokio::test]
    async fn empty_read_signals_eof() {
        let input_file = tempfile::NamedTempFile::new().unwrap();
        let mut transport = FileTransport::new(input_file.path(), None);
        transport.open().await.unwrap();
        assert!(matches!(transport.read(16).await, Err(TransportError::Eof)));
    }
}
