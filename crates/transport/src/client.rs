use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use serde_json::Value;

use crate::codec::{FrameReader, PollResult, write_message};
use crate::error::{Error, Result};
use crate::io::{DapTransport, PeerControl};
use crate::message::{Event, Message, Request, Response, Seq};
use crate::request_store::{RequestStore, WaitingRequest, with_lock};

/// How long to sleep when a non-blocking transport has nothing to read
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for the adapter to report an exit code once its output closed
const EXIT_CODE_GRACE: Duration = Duration::from_secs(1);

/// Outcome of a reverse request handled by a [`Listener`]
pub type ReverseResponse = std::result::Result<Option<Value>, String>;

/// Receives everything the adapter sends that is not a response to one of our requests.
///
/// Listeners run synchronously on the inbound loop thread, in registration order. A
/// listener that blocks stalls all further message processing, so hand work off to
/// another thread, and never call [`Client::send_request_sync`] from a listener.
pub trait Listener: Send + Sync + 'static {
    fn on_event(&self, event: &Event);

    /// Offer to answer a reverse request. The first listener returning `Some` wins;
    /// unanswered requests receive a failure response.
    fn on_request(&self, _request: &Request) -> Option<ReverseResponse> {
        None
    }

    /// A frame could not be decoded or a response matched no request
    fn on_error(&self, _error: &Error) {}

    /// The inbound stream ended, either because the adapter went away or because the
    /// client was stopped. Called exactly once.
    fn on_closed(&self, _exit_code: Option<i32>) {}
}

/// Notifications delivered by the channel [`Listener`]
#[derive(Debug, Clone)]
pub enum Notification {
    Event(Event),
    Error(String),
    Closed { exit_code: Option<i32> },
}

impl Listener for crossbeam_channel::Sender<Notification> {
    fn on_event(&self, event: &Event) {
        let _ = self.send(Notification::Event(event.clone()));
    }

    fn on_error(&self, error: &Error) {
        let _ = self.send(Notification::Error(error.to_string()));
    }

    fn on_closed(&self, exit_code: Option<i32>) {
        let _ = self.send(Notification::Closed { exit_code });
    }
}

struct Shared {
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    sequence_number: AtomicI64,
    store: RequestStore,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    peer: Mutex<Box<dyn PeerControl>>,
    stopped: AtomicBool,
    exit_code: Mutex<Option<i32>>,
    inbound_thread: OnceLock<ThreadId>,
}

/// Protocol client
///
/// Assigns sequence numbers, correlates responses with the requests that caused them and
/// fans events out to the registered [`Listener`]s. Cloning gives another handle on the
/// same connection.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

/// Handle on the eventual response to a request sent with [`Client::send_request_async`]
#[must_use = "the response is discarded unless waited for"]
pub struct PendingResponse {
    command: String,
    seq: Seq,
    rx: oneshot::Receiver<Result<Response>>,
}

impl PendingResponse {
    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Block until the response arrives or the request is abandoned
    pub fn wait(self) -> Result<Response> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(Error::RequestAbandoned {
                command: self.command,
                seq: self.seq,
            })
        })
    }

    /// Like [`PendingResponse::wait`], giving up after `timeout`
    ///
    /// Returns `None` on timeout; the request stays pending until the client stops.
    pub fn wait_timeout(self, timeout: Duration) -> Option<Result<Response>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(oneshot::RecvTimeoutError::Timeout) => None,
            Err(oneshot::RecvTimeoutError::Disconnected) => Some(Err(Error::RequestAbandoned {
                command: self.command,
                seq: self.seq,
            })),
        }
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("command", &self.command)
            .field("seq", &self.seq)
            .finish()
    }
}

impl Client {
    /// Start a client over `transport`
    ///
    /// The inbound loop starts immediately, so listeners that must not miss early events
    /// are passed here rather than added later.
    pub fn with_transport<T>(
        transport: T,
        listeners: impl IntoIterator<Item = Arc<dyn Listener>>,
    ) -> Result<Self>
    where
        T: DapTransport,
    {
        let (reader, writer, peer) = transport.split()?;

        let shared = Arc::new(Shared {
            writer: Mutex::new(Some(Box::new(writer))),
            sequence_number: AtomicI64::new(0),
            store: RequestStore::default(),
            listeners: RwLock::new(listeners.into_iter().collect()),
            peer: Mutex::new(peer),
            stopped: AtomicBool::new(false),
            exit_code: Mutex::new(None),
            inbound_thread: OnceLock::new(),
        });

        let weak = Arc::downgrade(&shared);
        let handle = thread::Builder::new()
            .name("dap-inbound".to_string())
            .spawn(move || inbound_loop(reader, weak))?;
        let _ = shared.inbound_thread.set(handle.thread().id());

        Ok(Self { shared })
    }

    /// Register another listener, invoked after those already registered
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Send a request without waiting for its response
    #[tracing::instrument(skip(self, arguments), level = "debug")]
    pub fn send_request_async(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<PendingResponse> {
        if self.is_stopped() {
            return Err(Error::ClientStopped);
        }

        with_lock("Client.writer", &self.shared.writer, |mut writer| {
            let Some(writer) = writer.as_mut() else {
                return Err(Error::ClientStopped);
            };

            let seq = self.shared.next_seq();
            let (tx, rx) = oneshot::channel();
            self.shared.store.insert(
                seq,
                WaitingRequest {
                    command: command.to_string(),
                    tx,
                },
            );

            let message = Message::Request(Request {
                seq,
                command: command.to_string(),
                arguments,
            });
            if let Err(e) = write_message(writer.as_mut(), &message) {
                self.shared.store.remove(seq);
                return Err(e);
            }
            tracing::debug!(seq, "sent request");

            Ok(PendingResponse {
                command: command.to_string(),
                seq,
                rx,
            })
        })
    }

    /// Send a request and block the calling thread until its response arrives.
    ///
    /// Meant for strictly ordered exchanges such as the startup handshake. Must not be
    /// called from a [`Listener`] callback: the inbound loop would wait on itself.
    pub fn send_request_sync(&self, command: &str, arguments: Option<Value>) -> Result<Response> {
        debug_assert_ne!(
            self.shared.inbound_thread.get().copied(),
            Some(thread::current().id()),
            "send_request_sync called from the inbound loop thread"
        );
        self.send_request_async(command, arguments)?.wait()
    }

    /// Stop the client: terminate the peer, abandon outstanding requests and release the
    /// transport.
    ///
    /// Idempotent. Listeners get their `on_closed` callback once the inbound loop notices.
    pub fn stop(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("stopping client");
        }
        // a write blocked on a peer that stopped reading holds the writer lock until the
        // peer is gone
        with_lock("Client.peer", &self.shared.peer, |mut peer| peer.terminate());
        self.shared.release();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Exit code of the adapter, once it is known
    pub fn exit_code(&self) -> Option<i32> {
        self.shared.exit_code(Duration::ZERO)
    }

    /// Number of requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.shared.store.len()
    }
}

impl Shared {
    fn next_seq(&self) -> Seq {
        self.sequence_number.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Drop the writer, then fail what is still pending.
    ///
    /// Requests already waiting are failed before the writer lock is taken, and again
    /// after, so that no request can be registered once the pending table is drained.
    fn release(&self) {
        let mut abandoned = self.store.abandon_all();
        let writer = with_lock("Client.writer", &self.writer, |mut writer| writer.take());
        drop(writer);

        abandoned += self.store.abandon_all();
        if abandoned > 0 {
            tracing::debug!(abandoned, "abandoned outstanding requests");
        }
    }

    fn exit_code(&self, grace: Duration) -> Option<i32> {
        let cached = with_lock("Client.exit_code", &self.exit_code, |code| *code);
        if cached.is_some() {
            return cached;
        }

        let code = with_lock("Client.peer", &self.peer, |mut peer| peer.exit_code(grace));
        with_lock("Client.exit_code", &self.exit_code, |mut cached| {
            *cached = cached.or(code);
            *cached
        })
    }

    fn listeners(&self) -> Vec<Arc<dyn Listener>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Response(response) => {
                let seq = response.request_seq;
                if let Err(response) = self.store.complete(response) {
                    tracing::warn!(
                        request_seq = seq,
                        command = %response.command,
                        "no pending request for response, dropping"
                    );
                    let error = Error::ProtocolViolation(format!(
                        "response to unknown request {seq} ({})",
                        response.command
                    ));
                    self.notify_error(&error);
                }
            }
            Message::Event(event) => {
                tracing::debug!(event = %event.event, "received event");
                for listener in self.listeners() {
                    listener.on_event(&event);
                }
            }
            Message::Request(request) => self.answer(request),
        }
    }

    fn answer(&self, request: Request) {
        tracing::debug!(command = %request.command, seq = request.seq, "received reverse request");
        let outcome = self
            .listeners()
            .iter()
            .find_map(|listener| listener.on_request(&request))
            .unwrap_or_else(|| Err(format!("unsupported request {}", request.command)));

        with_lock("Client.writer", &self.writer, |mut writer| {
            let Some(writer) = writer.as_mut() else {
                tracing::debug!("client stopped, not answering reverse request");
                return;
            };
            let seq = self.next_seq();
            let response = match outcome {
                Ok(body) => Response::success(seq, &request, body),
                Err(message) => Response::failure(seq, &request, message),
            };
            if let Err(e) = write_message(writer.as_mut(), &Message::Response(response)) {
                tracing::warn!(error = %e, "failed to answer reverse request");
            }
        });
    }

    fn notify_error(&self, error: &Error) {
        for listener in self.listeners() {
            listener.on_error(error);
        }
    }

    fn closed(&self) {
        let explicit = self.stopped.swap(true, Ordering::SeqCst);
        self.release();

        let exit_code = if explicit {
            self.exit_code(Duration::ZERO)
        } else {
            self.exit_code(EXIT_CODE_GRACE)
        };
        tracing::debug!(explicit, ?exit_code, "inbound stream closed");

        for listener in self.listeners() {
            listener.on_closed(exit_code);
        }
    }
}

fn inbound_loop<R>(input: R, shared: Weak<Shared>)
where
    R: BufRead,
{
    let mut reader = FrameReader::new(input);
    loop {
        let result = reader.poll();
        let Some(shared) = shared.upgrade() else {
            tracing::debug!("client dropped, ending inbound loop");
            return;
        };

        match result {
            Ok(PollResult::Message(message)) => shared.dispatch(message),
            Ok(PollResult::Idle) => {
                if shared.stopped.load(Ordering::SeqCst) {
                    break;
                }
                drop(shared);
                thread::sleep(IDLE_POLL_INTERVAL);
            }
            Ok(PollResult::Closed) => break,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "skipping malformed frame");
                shared.notify_error(&e);
            }
            Err(e) => {
                tracing::error!(error = %e, "inbound stream broken");
                shared.notify_error(&e);
                break;
            }
        }
    }

    if let Some(shared) = shared.upgrade() {
        shared.closed();
    }
}
