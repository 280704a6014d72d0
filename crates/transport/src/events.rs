//! Events emitted by a debug adapter
use serde::{Deserialize, Serialize};

use crate::message;

/// Typed view of the events the bridge reacts to
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Event {
    Initialized,
    Output(OutputEventBody),
    Exited(ExitedEventBody),
    Terminated,
    /// Any other event, or a known event whose body could not be parsed
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEventBody {
    pub category: Option<String>,
    pub output: String,
}

impl OutputEventBody {
    /// Whether the output belongs on the error stream
    pub fn is_error(&self) -> bool {
        matches!(self.category.as_deref(), Some("stderr" | "important"))
    }

    pub fn is_telemetry(&self) -> bool {
        self.category.as_deref() == Some("telemetry")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    pub exit_code: i64,
}

impl From<&message::Event> for Event {
    fn from(event: &message::Event) -> Self {
        fn body<T: for<'de> Deserialize<'de>>(event: &message::Event) -> Option<T> {
            let value = event.body.clone()?;
            serde_json::from_value(value)
                .inspect_err(|e| {
                    tracing::debug!(event = %event.event, error = %e, "could not parse event body")
                })
                .ok()
        }

        match event.event.as_str() {
            "initialized" => Event::Initialized,
            "terminated" => Event::Terminated,
            "output" => body(event)
                .map(Event::Output)
                .unwrap_or_else(|| Event::Unknown(event.event.clone())),
            "exited" => body(event)
                .map(Event::Exited)
                .unwrap_or_else(|| Event::Unknown(event.event.clone())),
            other => {
                tracing::trace!(event = other, "received unhandled event");
                Event::Unknown(other.to_string())
            }
        }
    }
}
