//! Protocol client tests against a scripted adapter over the in-memory transport

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use eyre::{Result, WrapErr};
use serde_json::json;
use transport::{
    Client, Error, Listener, Notification,
    codec::{FrameReader, write_message},
    io::{DapTransport, InMemoryReader, InMemoryTransport, InMemoryWriter, PeerControl},
    message::{Event, Message, Request, Response},
};

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let _ = color_eyre::install();
}

/// The adapter's end of an in-memory pair
struct Adapter {
    reader: FrameReader<InMemoryReader>,
    writer: InMemoryWriter,
    seq: i64,
}

impl Adapter {
    fn new(transport: InMemoryTransport) -> Result<Self> {
        let (reader, writer, _) = transport.split()?;
        Ok(Self {
            reader: FrameReader::new(reader),
            writer,
            seq: 0,
        })
    }

    fn next_request(&mut self) -> Result<Request> {
        loop {
            match self.reader.poll_message()? {
                Some(Message::Request(request)) => return Ok(request),
                Some(other) => tracing::debug!(message = ?other, "adapter ignoring message"),
                None => eyre::bail!("client closed the connection"),
            }
        }
    }

    fn next_response(&mut self) -> Result<Response> {
        match self.reader.poll_message()? {
            Some(Message::Response(response)) => Ok(response),
            other => eyre::bail!("expected a response, got {other:?}"),
        }
    }

    fn respond(&mut self, request: &Request, body: serde_json::Value) -> Result<()> {
        self.seq += 1;
        let response = Response::success(self.seq, request, Some(body));
        self.send(Message::Response(response))
    }

    fn send(&mut self, message: Message) -> Result<()> {
        write_message(&mut self.writer, &message).wrap_err("adapter writing message")
    }
}

fn notifications() -> (
    Arc<dyn Listener>,
    crossbeam_channel::Receiver<Notification>,
) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Arc::new(tx), rx)
}

#[test]
fn request_response_and_events() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let (listener, rx) = notifications();
    let client = Client::with_transport(client_transport, vec![listener])?;

    let adapter = thread::spawn(move || -> Result<()> {
        let mut adapter = Adapter::new(adapter_transport)?;
        let request = adapter.next_request()?;
        assert_eq!(request.command, "initialize");
        adapter.respond(&request, json!({"supportsConfigurationDoneRequest": true}))?;
        adapter.send(Message::Event(Event::new("initialized", None)))?;
        Ok(())
    });

    let response = client.send_request_sync("initialize", Some(json!({"adapterID": "test"})))?;
    assert!(response.success);
    assert_eq!(response.command, "initialize");

    match rx.recv_timeout(Duration::from_secs(5))? {
        Notification::Event(event) => assert_eq!(event.event, "initialized"),
        other => panic!("unexpected notification {other:?}"),
    }

    adapter.join().unwrap()?;
    client.stop();
    Ok(())
}

#[test]
fn out_of_order_responses_are_routed_by_sequence() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let client = Client::with_transport(client_transport, Vec::new())?;

    let adapter = thread::spawn(move || -> Result<()> {
        let mut adapter = Adapter::new(adapter_transport)?;
        let requests = (0..3)
            .map(|_| adapter.next_request())
            .collect::<Result<Vec<_>>>()?;
        for request in requests.iter().rev() {
            adapter.respond(request, json!({"echo": request.arguments}))?;
        }
        Ok(())
    });

    let pending = (0..3)
        .map(|i| client.send_request_async("evaluate", Some(json!({"expression": i}))))
        .collect::<Result<Vec<_>, _>>()?;

    let seqs: Vec<_> = pending.iter().map(|p| p.seq()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "sequence numbers {seqs:?}");

    for (i, pending) in pending.into_iter().enumerate() {
        let seq = pending.seq();
        let response = pending.wait()?;
        assert_eq!(response.request_seq, seq);
        assert_eq!(response.body, Some(json!({"echo": {"expression": i}})));
    }

    adapter.join().unwrap()?;
    client.stop();
    Ok(())
}

#[test]
fn unmatched_response_is_dropped() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let (listener, rx) = notifications();
    let client = Client::with_transport(client_transport, vec![listener])?;

    let adapter = thread::spawn(move || -> Result<()> {
        let mut adapter = Adapter::new(adapter_transport)?;
        let request = adapter.next_request()?;
        let bogus = Request {
            seq: request.seq + 1000,
            command: "threads".to_string(),
            arguments: None,
        };
        adapter.respond(&bogus, json!({}))?;
        adapter.respond(&request, json!({"threads": []}))?;
        Ok(())
    });

    let response = client.send_request_sync("threads", None)?;
    assert_eq!(response.body, Some(json!({"threads": []})));

    match rx.recv_timeout(Duration::from_secs(5))? {
        Notification::Error(message) => assert!(message.contains("unknown request"), "{message}"),
        other => panic!("unexpected notification {other:?}"),
    }

    adapter.join().unwrap()?;
    client.stop();
    Ok(())
}

#[test]
fn failed_response_is_request_failed() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let client = Client::with_transport(client_transport, Vec::new())?;

    let adapter = thread::spawn(move || -> Result<()> {
        let mut adapter = Adapter::new(adapter_transport)?;
        let request = adapter.next_request()?;
        adapter.send(Message::Response(Response::failure(1, &request, "no such program")))?;
        Ok(())
    });

    match client.send_request_sync("launch", Some(json!({"program": "/nowhere"}))) {
        Err(Error::RequestFailed {
            command, message, ..
        }) => {
            assert_eq!(command, "launch");
            assert_eq!(message.as_deref(), Some("no such program"));
        }
        other => panic!("unexpected result {other:?}"),
    }

    adapter.join().unwrap()?;
    client.stop();
    Ok(())
}

#[test]
fn stopping_abandons_outstanding_requests() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let (listener, rx) = notifications();
    let client = Client::with_transport(client_transport, vec![listener])?;

    let pending = (0..4)
        .map(|_| client.send_request_async("threads", None))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(client.pending_requests(), 4);

    // a thread blocked in a synchronous wait must be released too
    let blocked = {
        let client = client.clone();
        thread::spawn(move || client.send_request_sync("stackTrace", None))
    };
    while client.pending_requests() < 5 {
        thread::sleep(Duration::from_millis(5));
    }

    client.stop();
    client.stop();

    for pending in pending {
        assert!(matches!(pending.wait(), Err(Error::RequestAbandoned { .. })));
    }
    assert!(matches!(
        blocked.join().unwrap(),
        Err(Error::RequestAbandoned { ref command, .. }) if command == "stackTrace"
    ));
    assert_eq!(client.pending_requests(), 0);
    assert!(matches!(
        client.send_request_async("threads", None),
        Err(Error::ClientStopped)
    ));

    match rx.recv_timeout(Duration::from_secs(5))? {
        Notification::Closed { .. } => {}
        other => panic!("unexpected notification {other:?}"),
    }
    drop(adapter_transport);
    Ok(())
}

#[test]
fn adapter_exit_is_reported_once() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let exit = adapter_transport.exit();
    let (listener, rx) = notifications();
    let client = Client::with_transport(client_transport, vec![listener])?;

    let pending = client.send_request_async("threads", None)?;

    exit.set(3);
    drop(adapter_transport);

    match rx.recv_timeout(Duration::from_secs(5))? {
        Notification::Closed { exit_code } => assert_eq!(exit_code, Some(3)),
        other => panic!("unexpected notification {other:?}"),
    }
    assert!(matches!(pending.wait(), Err(Error::RequestAbandoned { .. })));
    assert!(client.is_stopped());
    assert_eq!(client.exit_code(), Some(3));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    Ok(())
}

#[test]
fn unanswered_reverse_request_gets_failure_response() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let client = Client::with_transport(client_transport, Vec::new())?;

    let mut adapter = Adapter::new(adapter_transport)?;
    adapter.send(Message::Request(Request {
        seq: 1,
        command: "startDebugging".to_string(),
        arguments: Some(json!({})),
    }))?;

    let response = adapter.next_response()?;
    assert_eq!(response.request_seq, 1);
    assert!(!response.success);
    assert_eq!(response.command, "startDebugging");

    client.stop();
    Ok(())
}

#[test]
fn listeners_run_in_registration_order() -> Result<()> {
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Listener for Recorder {
        fn on_event(&self, event: &Event) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.event));
        }
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let (channel, rx) = notifications();
    let first: Arc<dyn Listener> = Arc::new(Recorder {
        name: "first",
        log: Arc::clone(&log),
    });
    let client = Client::with_transport(client_transport, vec![first])?;
    client.add_listener(Arc::new(Recorder {
        name: "second",
        log: Arc::clone(&log),
    }));
    client.add_listener(channel);

    let mut adapter = Adapter::new(adapter_transport)?;
    adapter.send(Message::Event(Event::new("output", Some(json!({"output": "hi"})))))?;
    adapter.send(Message::Event(Event::new("terminated", None)))?;

    for _ in 0..2 {
        rx.recv_timeout(Duration::from_secs(5))?;
    }
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "first:output",
            "second:output",
            "first:terminated",
            "second:terminated"
        ]
    );

    client.stop();
    Ok(())
}

#[test]
fn malformed_frame_is_reported_and_skipped() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let (listener, rx) = notifications();
    let client = Client::with_transport(client_transport, vec![listener])?;

    let adapter = thread::spawn(move || -> Result<()> {
        let mut adapter = Adapter::new(adapter_transport)?;
        let request = adapter.next_request()?;
        adapter.writer.write_all(b"Content-Length: 5\r\n\r\n{oops")?;
        adapter.respond(&request, json!({"threads": []}))?;
        Ok(())
    });

    let response = client.send_request_sync("threads", None)?;
    assert_eq!(response.body, Some(json!({"threads": []})));

    match rx.recv_timeout(Duration::from_secs(5))? {
        Notification::Error(message) => assert!(message.contains("JSON"), "{message}"),
        other => panic!("unexpected notification {other:?}"),
    }

    adapter.join().unwrap()?;
    client.stop();
    Ok(())
}

/// Client side of a hung adapter: writes block like a full pipe until the peer is
/// terminated, then fail
struct HungAdapter {
    reader: InMemoryReader,
}

struct BlockedWriter {
    hang_up: crossbeam_channel::Receiver<()>,
}

impl Write for BlockedWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        // only returns once the sender is dropped
        let _ = self.hang_up.recv();
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct HungPeer {
    hang_up: Option<crossbeam_channel::Sender<()>>,
}

impl PeerControl for HungPeer {
    fn terminate(&mut self) {
        self.hang_up.take();
    }

    fn exit_code(&mut self, _grace: Duration) -> Option<i32> {
        None
    }
}

impl DapTransport for HungAdapter {
    type Reader = InMemoryReader;
    type Writer = BlockedWriter;

    fn split(self) -> transport::Result<(Self::Reader, Self::Writer, Box<dyn PeerControl>)> {
        let (tx, rx) = crossbeam_channel::bounded(0);
        let peer = HungPeer { hang_up: Some(tx) };
        Ok((self.reader, BlockedWriter { hang_up: rx }, Box::new(peer)))
    }
}

#[test]
fn stop_releases_a_write_blocked_on_a_hung_adapter() -> Result<()> {
    let (client_transport, adapter_transport) = InMemoryTransport::pair();
    let (reader, _writer, _) = client_transport.split()?;
    let client = Client::with_transport(HungAdapter { reader }, Vec::new())?;

    let blocked = {
        let client = client.clone();
        thread::spawn(move || client.send_request_sync("initialize", None))
    };
    while client.pending_requests() < 1 {
        thread::sleep(Duration::from_millis(5));
    }

    let (stopped_tx, stopped_rx) = crossbeam_channel::bounded(1);
    let stopper = {
        let client = client.clone();
        thread::spawn(move || {
            client.stop();
            let _ = stopped_tx.send(());
        })
    };
    stopped_rx
        .recv_timeout(Duration::from_secs(5))
        .wrap_err("stop did not return")?;
    stopper.join().unwrap();

    assert!(blocked.join().unwrap().is_err());
    assert_eq!(client.pending_requests(), 0);
    assert!(matches!(
        client.send_request_async("threads", None),
        Err(Error::ClientStopped)
    ));
    drop(adapter_transport);
    Ok(())
}
