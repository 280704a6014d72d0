//! Wire-level message model
//!
//! Every frame on the wire carries exactly one [`Message`]. Payloads are kept as untyped
//! JSON so that the client never needs to know the shape of a command it forwards;
//! typed views of the handshake payloads live in [`crate::requests`],
//! [`crate::responses`] and [`crate::events`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number type for message ordering and request-response correlation.
pub type Seq = i64;

/// A single protocol message, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// A request, either sent by us or a reverse request from the adapter.
    Request(Request),
    /// A response correlated to a request by `request_seq`.
    Response(Response),
    /// An unsolicited notification.
    Event(Event),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub seq: Seq,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub seq: Seq,
    pub request_seq: Seq,
    pub success: bool,
    #[serde(default)]
    pub command: String,
    /// Error description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub seq: Seq,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Successful response to `request`
    pub fn success(seq: Seq, request: &Request, body: Option<Value>) -> Self {
        Self {
            seq,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// Failed response to `request` carrying an error description
    pub fn failure(seq: Seq, request: &Request, message: impl Into<String>) -> Self {
        Self {
            seq,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            event: event.into(),
            body,
        }
    }
}
