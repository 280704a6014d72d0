//! In-memory transport implementation for testing

use std::io::{self, BufRead, Cursor, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{DapTransport, PeerControl};
use crate::error::Result;

/// In-memory transport for testing
///
/// Both ends are built from channels, so a test can play the debug adapter on a thread
/// of its own without spawning a process.
///
/// ```
/// use transport::io::{DapTransport, InMemoryTransport};
///
/// let (client, adapter) = InMemoryTransport::pair();
/// let exit = adapter.exit();
///
/// // the adapter side reads requests and writes responses
/// let (_reader, _writer, _) = adapter.split()?;
/// exit.set(0);
/// # drop(client);
/// # Ok::<(), transport::Error>(())
/// ```
pub struct InMemoryTransport {
    reader: InMemoryReader,
    writer: InMemoryWriter,
    exit: PeerExit,
}

/// Reader half of in-memory transport
///
/// Returns `WouldBlock` while the channel is empty and end of file once the other side
/// has dropped its writer.
pub struct InMemoryReader {
    buffer: Cursor<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Writer half of in-memory transport
pub struct InMemoryWriter {
    tx: Sender<Vec<u8>>,
}

/// Exit code slot shared by both ends of an in-memory pair
#[derive(Debug, Clone, Default)]
pub struct PeerExit(Arc<Mutex<Option<i32>>>);

impl PeerExit {
    /// Record the exit code the simulated adapter "exited" with
    pub fn set(&self, code: i32) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(code);
    }

    fn get(&self) -> Option<i32> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct InMemoryPeer {
    exit: PeerExit,
}

impl PeerControl for InMemoryPeer {
    fn terminate(&mut self) {
        // the peer notices once our writer is dropped
        tracing::trace!("terminating in-memory peer");
    }

    fn exit_code(&mut self, _grace: Duration) -> Option<i32> {
        self.exit.get()
    }
}

impl InMemoryTransport {
    /// Create a connected pair of in-memory transports
    ///
    /// Returns `(client_transport, adapter_transport)`; data written to one can be read
    /// from the other.
    pub fn pair() -> (Self, Self) {
        let (client_tx, server_rx) = crossbeam_channel::unbounded();
        let (server_tx, client_rx) = crossbeam_channel::unbounded();
        let exit = PeerExit::default();

        let client = Self {
            reader: InMemoryReader::new(client_rx),
            writer: InMemoryWriter { tx: client_tx },
            exit: exit.clone(),
        };

        let server = Self {
            reader: InMemoryReader::new(server_rx),
            writer: InMemoryWriter { tx: server_tx },
            exit,
        };

        (client, server)
    }

    /// Handle on the exit code reported to the client side
    pub fn exit(&self) -> PeerExit {
        self.exit.clone()
    }
}

impl DapTransport for InMemoryTransport {
    type Reader = InMemoryReader;
    type Writer = InMemoryWriter;

    fn split(self) -> Result<(Self::Reader, Self::Writer, Box<dyn PeerControl>)> {
        let control = InMemoryPeer { exit: self.exit };
        Ok((self.reader, self.writer, Box::new(control)))
    }
}

impl InMemoryReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            buffer: Cursor::new(Vec::new()),
            rx,
        }
    }
}

impl BufRead for InMemoryReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.try_recv() {
                Ok(data) => {
                    self.buffer = Cursor::new(data);
                }
                Err(TryRecvError::Empty) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "no data available",
                    ));
                }
                Err(TryRecvError::Disconnected) => {
                    return Ok(&[]);
                }
            }
        }

        self.buffer.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.buffer.consume(amt)
    }
}

impl Read for InMemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = std::cmp::min(available.len(), buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidirectional_communication() -> eyre::Result<()> {
        let (client, server) = InMemoryTransport::pair();
        let (mut client_reader, mut client_writer, _) = client.split()?;
        let (mut server_reader, mut server_writer, _) = server.split()?;

        let msg = b"Hello from client";
        client_writer.write_all(msg)?;
        let mut buf = vec![0u8; msg.len()];
        server_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, msg);

        let response = b"Hello from adapter";
        server_writer.write_all(response)?;
        let mut buf = vec![0u8; response.len()];
        client_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, response);

        Ok(())
    }

    #[test]
    fn test_would_block_on_empty_channel() -> eyre::Result<()> {
        let (client, _server) = InMemoryTransport::pair();
        let (mut reader, _writer, _) = client.split()?;

        match reader.fill_buf() {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            other => panic!("expected WouldBlock, got {other:?}"),
        }
    }

    #[test]
    fn test_eof_on_disconnect() -> eyre::Result<()> {
        let (client, server) = InMemoryTransport::pair();
        let (mut reader, _writer, _) = client.split()?;

        drop(server);

        assert!(reader.fill_buf()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_exit_code_is_shared() -> eyre::Result<()> {
        let (client, server) = InMemoryTransport::pair();
        let exit = server.exit();
        let (_reader, _writer, mut control) = client.split()?;

        assert_eq!(control.exit_code(Duration::ZERO), None);
        exit.set(42);
        assert_eq!(control.exit_code(Duration::ZERO), Some(42));
        Ok(())
    }
}
