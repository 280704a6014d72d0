//! IO abstraction layer for the transport
//!
//! [`DapTransport`] hides where the bytes come from: a debug adapter child process
//! ([`ProcessTransport`]) in production, or a pair of channels ([`InMemoryTransport`])
//! when a test plays the adapter's part.
//!
//! ```
//! use transport::{Client, io::InMemoryTransport};
//!
//! let (client_transport, _adapter) = InMemoryTransport::pair();
//! let client = Client::with_transport(client_transport, Vec::new())?;
//! # client.stop();
//! # Ok::<(), transport::Error>(())
//! ```

use std::io::{BufRead, Write};
use std::time::Duration;

use crate::error::Result;

mod memory;
mod process;

pub use memory::{InMemoryReader, InMemoryTransport, InMemoryWriter, PeerExit};
pub use process::{AdapterProcess, ProcessTransport};

/// Trait for bidirectional message transport
///
/// The transport is split into three independently owned parts: the reader moves to the
/// inbound loop thread, the writer stays with the client, and the [`PeerControl`] lets
/// either side terminate the peer or collect its exit code.
///
/// Readers may either block or report `WouldBlock` when no data is available; the inbound
/// loop copes with both.
pub trait DapTransport: Send + 'static {
    type Reader: BufRead + Send + 'static;
    type Writer: Write + Send + 'static;

    fn split(self) -> Result<(Self::Reader, Self::Writer, Box<dyn PeerControl>)>;
}

/// Lifecycle handle on whatever sits at the other end of the transport
pub trait PeerControl: Send + 'static {
    /// Request termination of the peer. Must be idempotent and never fail.
    fn terminate(&mut self);

    /// Exit code reported by the peer, waiting at most `grace` for it to exit.
    fn exit_code(&mut self, grace: Duration) -> Option<i32>;
}
