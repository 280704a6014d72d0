//! Debug adapter transport and protocol client
//!
//! This crate speaks the framed JSON protocol of a debug adapter over a byte stream,
//! usually the stdio of a child process, and correlates responses with requests.
mod client;
pub mod codec;
mod error;
pub mod events;
pub mod io;
pub mod message;
mod request_store;
pub mod requests;
pub mod responses;

pub use client::{Client, Listener, Notification, PendingResponse, ReverseResponse};
pub use error::{CodecError, Error, Result};
pub use io::{DapTransport, InMemoryTransport, ProcessTransport};
pub use message::{Message, Seq};
