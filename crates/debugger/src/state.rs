use std::fmt;

/// Lifecycle of a debug adapter session
///
/// `Created → Initializing → Initialized → Configuring → Running → Stopping → Terminated`,
/// where any state may move to `Stopping` or straight to `Terminated`. `Terminated` is
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    Initializing,
    Initialized,
    Configuring,
    Running,
    Stopping,
    Terminated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Terminated
    }

    /// Whether the session is on its way down or already gone
    pub fn is_ending(self) -> bool {
        matches!(self, SessionState::Stopping | SessionState::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Initializing => "initializing",
            SessionState::Initialized => "initialized",
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Notifications published to whoever drives the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The handshake completed and the target is running
    Started,
    Output { stream: OutputStream, text: String },
    /// The target (and with it the adapter) is gone. Sent exactly once per spawned adapter.
    TargetExited { exit_code: Option<i64> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub process_id: i64,
    pub id: i64,
    pub name: String,
    pub location: String,
}
