//! Framing of protocol messages
//!
//! Each message is preceded by a header block terminated by an empty line:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <JSON body>
//! ```
//!
//! [`FrameReader`] keeps its partial state between calls so that it can sit on top of a
//! non-blocking reader that reports [`io::ErrorKind::WouldBlock`], as well as on top of a
//! plain blocking pipe.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::error::{CodecError, Result};
use crate::message::Message;

/// Default maximum message size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// Serialize `message` and write it as a single frame.
pub fn write_message<W>(out: &mut W, message: &Message) -> Result<()>
where
    W: Write + ?Sized,
{
    let json = serde_json::to_string(message).map_err(CodecError::JsonSerialize)?;
    tracing::trace!(content = %json, "sending raw message");
    write!(out, "{CONTENT_LENGTH}: {}\r\n\r\n{}", json.len(), json)?;
    out.flush()?;
    Ok(())
}

/// Result of a single [`FrameReader::poll`]
#[derive(Debug)]
pub enum PollResult {
    /// A complete message was decoded
    Message(Message),
    /// The stream reached end of file
    Closed,
    /// The underlying reader has no data right now
    Idle,
}

#[derive(Debug, Clone, Copy)]
enum ReaderState {
    Header,
    Content { length: usize },
}

pub struct FrameReader<R> {
    input: R,
    state: ReaderState,
    line: Vec<u8>,
    content: Vec<u8>,
    content_length: Option<usize>,
    malformed_length: Option<String>,
    seen_header: bool,
    max_message_size: usize,
}

impl<R> FrameReader<R>
where
    R: BufRead,
{
    pub fn new(input: R) -> Self {
        Self::with_max_size(input, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Reject any frame whose declared length is larger than `max_message_size`
    pub fn with_max_size(input: R, max_message_size: usize) -> Self {
        Self {
            input,
            state: ReaderState::Header,
            line: Vec::new(),
            content: Vec::new(),
            content_length: None,
            malformed_length: None,
            seen_header: false,
            max_message_size,
        }
    }

    /// Read until a full frame is available, the stream ends, or the input would block.
    ///
    /// Recoverable errors (see [`crate::Error::is_recoverable`]) leave the reader
    /// positioned at the start of the next frame.
    pub fn poll(&mut self) -> Result<PollResult> {
        loop {
            match self.state {
                ReaderState::Header => {
                    let read = match self.input.read_until(b'\n', &mut self.line) {
                        Ok(read) => read,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(PollResult::Idle);
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    };

                    if read == 0 {
                        if !self.line.is_empty() || self.seen_header {
                            tracing::debug!("stream closed part way through a frame header");
                        }
                        self.reset();
                        return Ok(PollResult::Closed);
                    }

                    if !self.line.ends_with(b"\n") {
                        continue;
                    }

                    let line = std::mem::take(&mut self.line);
                    self.handle_header_line(&line)?;
                }
                ReaderState::Content { length } => {
                    while self.content.len() < length {
                        let available = match self.input.fill_buf() {
                            Ok(available) => available,
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                                return Ok(PollResult::Idle);
                            }
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(e) => return Err(e.into()),
                        };

                        if available.is_empty() {
                            tracing::debug!(
                                expected = length,
                                received = self.content.len(),
                                "stream closed part way through a frame body"
                            );
                            self.reset();
                            return Ok(PollResult::Closed);
                        }

                        let take = available.len().min(length - self.content.len());
                        self.content.extend_from_slice(&available[..take]);
                        self.input.consume(take);
                    }

                    let content = std::mem::take(&mut self.content);
                    self.reset();

                    tracing::debug!(content = %String::from_utf8_lossy(&content), "received raw message");
                    let message =
                        serde_json::from_slice(&content).map_err(CodecError::JsonDeserialize)?;
                    return Ok(PollResult::Message(message));
                }
            }
        }
    }

    /// Block until a message arrives, sleeping while the input is idle.
    ///
    /// Returns `None` once the stream is closed.
    pub fn poll_message(&mut self) -> Result<Option<Message>> {
        loop {
            match self.poll()? {
                PollResult::Message(message) => return Ok(Some(message)),
                PollResult::Closed => return Ok(None),
                PollResult::Idle => std::thread::sleep(Duration::from_millis(10)),
            }
        }
    }

    fn handle_header_line(&mut self, line: &[u8]) -> Result<()> {
        let Ok(text) = std::str::from_utf8(line) else {
            self.reset();
            return Err(CodecError::InvalidUtf8.into());
        };
        let text = text.trim_end_matches(['\r', '\n']);

        if text.is_empty() {
            if !self.seen_header {
                // stray separator between frames
                return Ok(());
            }
            return self.finish_header();
        }

        // garbage left over from a broken frame may precede the next header on the same line
        let text = match text.find(CONTENT_LENGTH) {
            Some(idx) if idx > 0 => {
                tracing::warn!(skipped = &text[..idx], "discarding bytes before frame header");
                &text[idx..]
            }
            _ => text,
        };

        self.seen_header = true;
        match text.split_once(':') {
            Some((name, value)) if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) => {
                match value.trim().parse() {
                    Ok(length) => self.content_length = Some(length),
                    Err(_) => self.malformed_length = Some(value.trim().to_string()),
                }
            }
            Some((name, _)) => tracing::trace!(header = name, "ignoring header"),
            None => tracing::warn!(line = text, "ignoring malformed header line"),
        }
        Ok(())
    }

    fn finish_header(&mut self) -> Result<()> {
        let content_length = self.content_length.take();
        let malformed = self.malformed_length.take();
        self.seen_header = false;

        let length = match (content_length, malformed) {
            (Some(length), _) => length,
            (None, Some(value)) => return Err(CodecError::MalformedContentLength(value).into()),
            (None, None) => return Err(CodecError::MissingContentLength.into()),
        };

        if length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: length,
                max: self.max_message_size,
            }
            .into());
        }

        self.content.clear();
        self.content.reserve(length);
        self.state = ReaderState::Content { length };
        Ok(())
    }

    fn reset(&mut self) {
        self.state = ReaderState::Header;
        self.line.clear();
        self.content.clear();
        self.content_length = None;
        self.malformed_length = None;
        self.seen_header = false;
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};

    use super::*;
    use crate::error::Error;
    use crate::message::{Event, Message};

    const TERMINATED: &str =
        "Content-Length: 37\r\n\r\n{\"type\":\"event\",\"event\":\"terminated\"}";

    fn reader(input: &str) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::new(Cursor::new(input.as_bytes().to_vec()))
    }

    fn is_terminated(message: &Message) -> bool {
        matches!(message, Message::Event(Event { event, .. }) if event == "terminated")
    }

    #[test]
    fn single_message() -> eyre::Result<()> {
        let mut reader = reader(TERMINATED);

        let message = reader.poll_message()?.expect("a message");
        assert!(is_terminated(&message), "got {message:?}");
        assert!(reader.poll_message()?.is_none());
        Ok(())
    }

    #[test]
    fn multiple_messages() -> eyre::Result<()> {
        let mut reader = reader(&format!("{TERMINATED}{TERMINATED}"));

        for _ in 0..2 {
            let message = reader.poll_message()?.expect("a message");
            assert!(is_terminated(&message));
        }
        assert!(reader.poll_message()?.is_none());
        Ok(())
    }

    #[test]
    fn extra_headers_are_ignored() -> eyre::Result<()> {
        let input = "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: 37\r\n\r\n{\"type\":\"event\",\"event\":\"terminated\"}";
        let mut reader = reader(input);

        let message = reader.poll_message()?.expect("a message");
        assert!(is_terminated(&message));
        Ok(())
    }

    #[test]
    fn bad_json_is_recoverable() -> eyre::Result<()> {
        let input = format!("Content-Length: 5\r\n\r\n{{oops{TERMINATED}");
        let mut reader = reader(&input);

        let err = reader.poll_message().unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::JsonDeserialize(_))));
        assert!(err.is_recoverable());

        let message = reader.poll_message()?.expect("the next message");
        assert!(is_terminated(&message));
        Ok(())
    }

    #[test]
    fn missing_content_length() -> eyre::Result<()> {
        let input = format!("Content-Type: text/plain\r\n\r\n{{\"x\":1}}{TERMINATED}");
        let mut reader = reader(&input);

        let err = reader.poll_message().unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::MissingContentLength)));

        // the orphaned body is skipped when resynchronising on the next header
        let message = reader.poll_message()?.expect("the next message");
        assert!(is_terminated(&message));
        Ok(())
    }

    #[test]
    fn malformed_content_length() {
        let mut reader = reader("Content-Length: many\r\n\r\n{}");

        let err = reader.poll_message().unwrap_err();
        assert!(matches!(
            err,
            Error::Codec(CodecError::MalformedContentLength(ref value)) if value == "many"
        ));
    }

    #[test]
    fn message_too_large() {
        let mut reader = FrameReader::with_max_size(Cursor::new(TERMINATED.as_bytes()), 10);

        let err = reader.poll().unwrap_err();
        assert!(matches!(
            err,
            Error::Codec(CodecError::MessageTooLarge { size: 37, max: 10 })
        ));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn truncated_body_is_closed() -> eyre::Result<()> {
        let mut reader = reader("Content-Length: 37\r\n\r\n{\"type\":");

        assert!(matches!(reader.poll()?, PollResult::Closed));
        Ok(())
    }

    #[test]
    fn write_then_read() -> eyre::Result<()> {
        let event = Message::Event(Event::new("initialized", None));
        let mut buf = Vec::new();
        write_message(&mut buf, &event)?;

        let text = String::from_utf8(buf.clone())?;
        assert!(text.starts_with("Content-Length: "));

        let mut reader = FrameReader::new(BufReader::new(buf.as_slice()));
        assert_eq!(reader.poll_message()?, Some(event));
        Ok(())
    }
}
