//! Synchronous debugger session on top of a debug adapter
//!
//! [`DebugAdapterSession::run`] spawns the adapter and walks the handshake on the calling
//! thread:
//!
//! ```text
//! initialize ──► (response + initialized event, either order)
//!            ──► launch (response deferred)
//!            ──► settling delay ──► configurationDone   [if supported]
//!            ──► launch response ──► Started
//! ```
//!
//! Everything the adapter sends afterwards arrives on the client's inbound thread and is
//! turned into [`Event`]s on a channel that the caller drains at its own pace.
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use serde_json::{Map, Value};
use transport::events::{self, OutputEventBody};
use transport::message::{self, Request};
use transport::requests::{self, DisconnectArguments, InitializeArguments, RunInTerminalArguments};
use transport::responses::{Capabilities, RunInTerminalResponse};
use transport::{
    Client, CodecError, DapTransport, Listener, PendingResponse, ProcessTransport, ReverseResponse,
};

use crate::commands::{Command, Disposition};
use crate::error::{Result, SessionError};
use crate::start_info::AdapterStartInfo;
use crate::state::{Event, OutputStream, ProcessInfo, SessionState, ThreadInfo};

const DEFAULT_ADAPTER_ID: &str = "dap-bridge";
const DEFAULT_CONFIGURATION_DONE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Sent as `adapterID` in the `initialize` request
    pub adapter_id: String,
    /// Pause between `launch` and `configurationDone`, giving other collaborators the
    /// chance to set breakpoints first
    pub configuration_done_delay: Duration,
    /// Longest wait for the adapter to acknowledge `disconnect`
    pub disconnect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            adapter_id: DEFAULT_ADAPTER_ID.to_string(),
            configuration_done_delay: DEFAULT_CONFIGURATION_DONE_DELAY,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }
}

impl From<&config::Config> for SessionOptions {
    fn from(config: &config::Config) -> Self {
        Self {
            adapter_id: config.session.adapter_id.clone(),
            configuration_done_delay: config.session.configuration_done_delay(),
            disconnect_timeout: config.session.disconnect_timeout(),
        }
    }
}

impl From<config::Config> for SessionOptions {
    fn from(config: config::Config) -> Self {
        Self::from(&config)
    }
}

enum Handshake {
    Initialized,
    Closed,
}

struct SessionInner {
    options: SessionOptions,
    state: Mutex<SessionState>,
    client: Mutex<Option<Client>>,
    capabilities: Mutex<Option<Capabilities>>,
    /// Code from the adapter's `exited` event
    exited_code: Mutex<Option<i64>>,
    exit_reported: AtomicBool,
    handshake_tx: Sender<Handshake>,
    handshake_rx: Receiver<Handshake>,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
}

/// A debugger session backed by a debug adapter process
///
/// Operations block the calling thread. Notifications are read from [`Self::events`].
/// Dropping the session stops it.
pub struct DebugAdapterSession {
    inner: Arc<SessionInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| {
        tracing::warn!("session lock poisoned, recovering");
        e.into_inner()
    })
}

fn encode<T: Serialize>(value: &T) -> transport::Result<Value> {
    serde_json::to_value(value).map_err(|e| CodecError::JsonSerialize(e).into())
}

impl DebugAdapterSession {
    pub fn new(options: SessionOptions) -> Self {
        let (handshake_tx, handshake_rx) = crossbeam_channel::unbounded();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(SessionInner {
                options,
                state: Mutex::new(SessionState::Created),
                client: Mutex::new(None),
                capabilities: Mutex::new(None),
                exited_code: Mutex::new(None),
                exit_reported: AtomicBool::new(false),
                handshake_tx,
                handshake_rx,
                events_tx,
                events_rx,
            }),
        }
    }

    /// Spawn the adapter described by `start_info` and drive it until the target runs
    ///
    /// A spawn failure leaves the session `Terminated` without any notification. Any
    /// later failure stops the adapter and emits [`Event::TargetExited`] before the error
    /// is returned.
    #[tracing::instrument(skip_all, fields(start_info = %start_info))]
    pub fn run(&self, start_info: &AdapterStartInfo) -> Result<()> {
        self.inner.begin()?;
        let transport = match ProcessTransport::start(
            &start_info.command,
            &start_info.arguments,
            start_info.working_directory.as_deref(),
        ) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!(error = %e, "could not start debug adapter");
                self.inner.set_state(SessionState::Terminated);
                return Err(e.into());
            }
        };
        if self.inner.is_ending() {
            tracing::info!("session stopped while the debug adapter was starting");
            drop(transport);
            self.inner.terminate(None);
            return Err(SessionError::Disconnected("initializing"));
        }
        self.inner
            .drive(transport, start_info.launch_arguments.clone())
    }

    /// Like [`Self::run`], over an already established transport
    pub fn run_with_transport<T>(&self, transport: T, launch_arguments: Map<String, Value>) -> Result<()>
    where
        T: DapTransport,
    {
        self.inner.begin()?;
        self.inner.drive(transport, launch_arguments)
    }

    /// Disconnect from the adapter and stop it. Idempotent.
    ///
    /// While [`Self::run`] is still connecting, the adapter is torn down by `run` itself,
    /// which then returns an error.
    #[tracing::instrument(skip(self))]
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.inner.state)
    }

    /// What the adapter reported in its `initialize` response
    pub fn capabilities(&self) -> Option<Capabilities> {
        lock(&self.inner.capabilities).clone()
    }

    /// Session notifications, in the order they happened
    pub fn events(&self) -> Receiver<Event> {
        self.inner.events_rx.clone()
    }

    pub fn processes(&self) -> Vec<ProcessInfo> {
        vec![ProcessInfo {
            id: 1,
            name: "DebugAdapter".to_string(),
        }]
    }

    pub fn threads(&self, process_id: i64) -> Vec<ThreadInfo> {
        vec![ThreadInfo {
            process_id,
            id: 1,
            name: "Main Thread".to_string(),
            location: String::new(),
        }]
    }

    /// Execute a debugger front-end command
    ///
    /// Attaching, detaching, inserting breakpoints and backtraces fail with
    /// [`SessionError::NotSupported`]; stepping and breakpoint bookkeeping are accepted and
    /// do nothing.
    pub fn execute(&self, command: Command) -> Result<()> {
        match command.disposition() {
            Disposition::NotSupported => Err(SessionError::NotSupported(command.name())),
            Disposition::Ignored => {
                tracing::debug!(command = command.name(), "ignoring command");
                Ok(())
            }
        }
    }

    /// Forward an arbitrary request to the adapter without waiting for the response
    pub fn request(&self, command: &str, arguments: Option<Value>) -> Result<PendingResponse> {
        let client = lock(&self.inner.client).clone();
        match client {
            Some(client) => Ok(client.send_request_async(command, arguments)?),
            None => Err(SessionError::InvalidState {
                operation: "send requests to",
                state: self.state(),
            }),
        }
    }
}

impl Default for DebugAdapterSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Drop for DebugAdapterSession {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl SessionInner {
    fn begin(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if *state != SessionState::Created {
            return Err(SessionError::InvalidState {
                operation: "run",
                state: *state,
            });
        }
        *state = SessionState::Initializing;
        Ok(())
    }

    fn set_state(&self, to: SessionState) {
        let mut state = lock(&self.state);
        tracing::debug!(from = %*state, %to, "session state");
        *state = to;
    }

    /// Move forward through the handshake unless the session is already going down
    fn advance(&self, to: SessionState) -> Result<()> {
        let mut state = lock(&self.state);
        if state.is_ending() {
            return Err(SessionError::InvalidState {
                operation: "run",
                state: *state,
            });
        }
        tracing::debug!(from = %*state, %to, "session state");
        *state = to;
        Ok(())
    }

    fn is_ending(&self) -> bool {
        lock(&self.state).is_ending()
    }

    /// Publish the connected client, unless a stop got in first
    fn attach(&self, client: &Client) -> bool {
        let state = lock(&self.state);
        if state.is_ending() {
            return false;
        }
        *lock(&self.client) = Some(client.clone());
        true
    }

    /// Mark the session terminated, returning false if it was already ending
    fn end(&self) -> bool {
        let mut state = lock(&self.state);
        if state.is_ending() {
            return false;
        }
        tracing::debug!(from = %*state, "session state: terminated");
        *state = SessionState::Terminated;
        true
    }

    fn drive<T>(self: &Arc<Self>, transport: T, launch_arguments: Map<String, Value>) -> Result<()>
    where
        T: DapTransport,
    {
        let listener: Arc<dyn Listener> = Arc::new(BridgeListener {
            session: Arc::downgrade(self),
        });
        let client = match Client::with_transport(transport, vec![listener]) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "could not connect to debug adapter");
                self.terminate(None);
                return Err(e.into());
            }
        };
        if !self.attach(&client) {
            tracing::info!("session stopped while connecting to the debug adapter");
            self.terminate(Some(client));
            return Err(SessionError::Disconnected("initializing"));
        }

        match self.handshake(&client, launch_arguments) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "debug adapter handshake failed");
                let client = lock(&self.client).take();
                self.terminate(client);
                Err(e)
            }
        }
    }

    fn handshake(&self, client: &Client, launch_arguments: Map<String, Value>) -> Result<()> {
        let arguments = encode(&InitializeArguments::new(&self.options.adapter_id))?;
        let response = client.send_request_sync(requests::INITIALIZE, Some(arguments))?;
        let capabilities = Capabilities::from_body(response.body.as_ref());
        tracing::debug!(?capabilities, "adapter capabilities");
        *lock(&self.capabilities) = Some(capabilities.clone());

        self.wait_for_initialized()?;
        self.advance(SessionState::Initialized)?;

        // some adapters hold the launch response back until configurationDone
        let launch = client.send_request_async(requests::LAUNCH, Some(Value::Object(launch_arguments)))?;
        self.advance(SessionState::Configuring)?;

        if capabilities.configuration_done() {
            self.settle()?;
            client.send_request_sync(requests::CONFIGURATION_DONE, None)?;
        }
        launch.wait()?;

        if let Err(e) = self.advance(SessionState::Running) {
            if self.exit_reported.load(Ordering::SeqCst) {
                tracing::info!("target exited before the session was running");
                return Ok(());
            }
            return Err(e);
        }
        tracing::info!("debug adapter session running");
        self.publish(Event::Started);
        Ok(())
    }

    fn wait_for_initialized(&self) -> Result<()> {
        match self.handshake_rx.recv() {
            Ok(Handshake::Initialized) => Ok(()),
            Ok(Handshake::Closed) | Err(_) => Err(SessionError::Disconnected("initializing")),
        }
    }

    /// Sit out the configuration delay, bailing out early if the adapter goes away
    fn settle(&self) -> Result<()> {
        let deadline = Instant::now() + self.options.configuration_done_delay;
        loop {
            match self.handshake_rx.recv_deadline(deadline) {
                Err(RecvTimeoutError::Timeout) => return Ok(()),
                Ok(Handshake::Initialized) => {
                    tracing::debug!("ignoring repeated initialized event");
                }
                Ok(Handshake::Closed) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(SessionError::Disconnected("configuring"));
                }
            }
        }
    }

    fn stop(&self) {
        {
            let mut state = lock(&self.state);
            match *state {
                SessionState::Created => {
                    *state = SessionState::Terminated;
                    return;
                }
                SessionState::Stopping | SessionState::Terminated => return,
                _ => *state = SessionState::Stopping,
            }
        }

        match lock(&self.client).take() {
            Some(client) => {
                self.disconnect(&client);
                self.terminate(Some(client));
            }
            // run() sees Stopping once it connects and tears the adapter down
            None => tracing::debug!("stop requested before the adapter was connected"),
        }
    }

    /// Best effort: failures are only logged
    fn disconnect(&self, client: &Client) {
        let arguments = DisconnectArguments {
            restart: Some(false),
            terminate_debuggee: Some(true),
        };
        let pending = encode(&arguments)
            .and_then(|arguments| client.send_request_async(requests::DISCONNECT, Some(arguments)));
        let pending = match pending {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "could not send disconnect");
                return;
            }
        };
        match pending.wait_timeout(self.options.disconnect_timeout) {
            Some(Ok(_)) => tracing::debug!("adapter acknowledged disconnect"),
            Some(Err(e)) => tracing::warn!(error = %e, "disconnect failed"),
            None => tracing::warn!(
                timeout = ?self.options.disconnect_timeout,
                "adapter did not acknowledge disconnect in time"
            ),
        }
    }

    /// Stop the client, mark the session terminated and report the exit
    fn terminate(&self, client: Option<Client>) {
        {
            // keep the closing client from treating this as a spontaneous exit
            let mut state = lock(&self.state);
            if !state.is_terminal() {
                *state = SessionState::Stopping;
            }
        }
        if let Some(client) = &client {
            client.stop();
        }
        self.set_state(SessionState::Terminated);
        self.report_exit(client.as_ref(), None);
    }

    /// The adapter ended the session on its own
    fn finish(&self, os_exit_code: Option<i32>) {
        if !self.end() {
            return;
        }
        let client = lock(&self.client).take();
        if let Some(client) = &client {
            client.stop();
        }
        self.report_exit(client.as_ref(), os_exit_code);
    }

    fn report_exit(&self, client: Option<&Client>, os_exit_code: Option<i32>) {
        if self.exit_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        let exit_code = (*lock(&self.exited_code))
            .or(os_exit_code.map(i64::from))
            .or_else(|| client.and_then(Client::exit_code).map(i64::from));
        tracing::info!(?exit_code, "debug target exited");
        self.publish(Event::TargetExited { exit_code });
    }

    fn publish(&self, event: Event) {
        if self.events_tx.send(event).is_err() {
            tracing::debug!("nobody listening for session events");
        }
    }

    fn output(&self, stream: OutputStream, text: String) {
        if lock(&self.state).is_terminal() {
            tracing::debug!(?stream, "dropping output after termination");
            return;
        }
        self.publish(Event::Output { stream, text });
    }

    fn handle_event(&self, event: events::Event) {
        match event {
            events::Event::Initialized => {
                let _ = self.handshake_tx.send(Handshake::Initialized);
            }
            events::Event::Output(body) => self.relay(body),
            events::Event::Exited(body) => {
                tracing::debug!(exit_code = body.exit_code, "adapter reported exit");
                *lock(&self.exited_code) = Some(body.exit_code);
            }
            events::Event::Terminated => {
                tracing::debug!("adapter terminated the session");
                self.finish(None);
            }
            other => tracing::trace!(event = ?other, "ignoring event"),
        }
    }

    fn relay(&self, body: OutputEventBody) {
        if body.is_telemetry() {
            return;
        }
        let stream = if body.is_error() {
            OutputStream::Stderr
        } else {
            OutputStream::Stdout
        };
        self.output(stream, body.output);
    }

    fn closed(&self, exit_code: Option<i32>) {
        let _ = self.handshake_tx.send(Handshake::Closed);
        self.finish(exit_code);
    }
}

struct BridgeListener {
    session: Weak<SessionInner>,
}

impl Listener for BridgeListener {
    fn on_event(&self, event: &message::Event) {
        if let Some(session) = self.session.upgrade() {
            session.handle_event(events::Event::from(event));
        }
    }

    fn on_request(&self, request: &Request) -> Option<ReverseResponse> {
        (request.command == requests::RUN_IN_TERMINAL).then(|| run_in_terminal(request))
    }

    fn on_error(&self, error: &transport::Error) {
        if let Some(session) = self.session.upgrade() {
            session.output(OutputStream::Stderr, format!("{error}\n"));
        }
    }

    fn on_closed(&self, exit_code: Option<i32>) {
        if let Some(session) = self.session.upgrade() {
            session.closed(exit_code);
        }
    }
}

/// Start the debuggee the adapter asked for, detached from the bridge
fn run_in_terminal(request: &Request) -> ReverseResponse {
    let arguments = request.arguments.clone().unwrap_or(Value::Null);
    let arguments: RunInTerminalArguments = serde_json::from_value(arguments)
        .map_err(|e| format!("invalid {} arguments: {e}", request.command))?;
    let Some((program, args)) = arguments.args.split_first() else {
        return Err("no command to run".to_string());
    };

    let mut command = std::process::Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if !arguments.cwd.is_empty() {
        command.current_dir(&arguments.cwd);
    }
    for (name, value) in arguments.env.iter().flatten() {
        match value {
            Some(value) => command.env(name, value),
            None => command.env_remove(name),
        };
    }

    let mut child = command
        .spawn()
        .map_err(|e| format!("failed to start {program}: {e}"))?;
    let process_id = child.id();
    tracing::info!(pid = process_id, %program, "started debuggee");

    let reaper = thread::Builder::new()
        .name("debuggee-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => tracing::debug!(pid = process_id, %status, "debuggee exited"),
            Err(e) => tracing::warn!(pid = process_id, error = %e, "could not wait for debuggee"),
        });
    if let Err(e) = reaper {
        tracing::warn!(error = %e, "could not start debuggee reaper thread");
    }

    let body = RunInTerminalResponse {
        process_id: Some(process_id),
        shell_process_id: None,
    };
    serde_json::to_value(body).map(Some).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::BreakpointLocation;

    #[test]
    fn options_from_config() {
        let mut config = config::Config::default();
        config.session.adapter_id = "mock".to_string();
        config.session.configuration_done_delay_ms = 10;

        let options = SessionOptions::from(&config);
        assert_eq!(options.adapter_id, "mock");
        assert_eq!(options.configuration_done_delay, Duration::from_millis(10));
        assert_eq!(options.disconnect_timeout, DEFAULT_DISCONNECT_TIMEOUT);
    }

    #[test]
    fn fixed_process_and_thread() {
        let session = DebugAdapterSession::default();
        assert_eq!(session.processes(), vec![ProcessInfo { id: 1, name: "DebugAdapter".to_string() }]);
        let threads = session.threads(42);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].process_id, 42);
        assert_eq!(threads[0].name, "Main Thread");
    }

    #[test]
    fn unsupported_and_ignored_commands() {
        let session = DebugAdapterSession::default();
        let location = BreakpointLocation {
            file: "main.c".into(),
            line: 3,
        };

        assert!(matches!(
            session.execute(Command::AttachToProcess { process_id: 7 }),
            Err(SessionError::NotSupported("attach"))
        ));
        assert!(matches!(
            session.execute(Command::InsertBreakpoint(location.clone())),
            Err(SessionError::NotSupported(_))
        ));
        assert!(session.execute(Command::Continue).is_ok());
        assert!(session.execute(Command::RemoveBreakpoint(location)).is_ok());
    }

    #[test]
    fn stopping_a_fresh_session_is_silent() {
        let session = DebugAdapterSession::default();
        let events = session.events();
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(events.try_recv().is_err());
        assert!(matches!(
            session.request("threads", None),
            Err(SessionError::InvalidState { .. })
        ));
    }
}
