//! Synchronous debugger sessions backed by debug adapters
//!
//! A [`DebugAdapterService`] resolves launch configurations and starts a
//! [`DebugAdapterSession`] for one of them. The session walks the adapter handshake and
//! reports what happens afterwards as [`Event`]s.
mod commands;
mod error;
mod expression;
mod service;
mod session;
mod start_info;
mod state;

pub use commands::{BreakpointLocation, Command};
pub use error::{Result, SessionError};
pub use expression::{DataTip, data_tip_at};
pub use service::DebugAdapterService;
pub use session::{DebugAdapterSession, SessionOptions};
pub use start_info::{AdapterStartInfo, ManagedRuntime, RuntimeLauncher};
pub use state::{Event, OutputStream, ProcessInfo, SessionState, ThreadInfo};
