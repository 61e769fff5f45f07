//! Function-call delta accumulation
//!
//! Tool-call deltas are rendered into the message text as a JSON object:
//! `{"name":"<fn>","arguments":<raw argument text>}`. The opening is written
//! when the name arrives, argument pieces are appended verbatim, and the closing
//! brace is written when the `tool_calls` finish signal arrives.
//!
//! Argument pieces are not validated as they arrive. The accumulated text is
//! only valid JSON once the backend has sent every piece and the call has been
//! closed; [`FunctionCallBuffer::parse`] reports anything else as an error.

use super::event::ToolCallDelta;
use serde::Deserialize;
use serde_json::Value;

/// A fully accumulated function call
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CallState {
    #[default]
    Idle,
    Open,
    Closed,
}

/// Accumulates one function call per stream
#[derive(Debug, Clone, Default)]
pub struct FunctionCallBuffer {
    text: String,
    state: CallState,
}

impl FunctionCallBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a delta, returning the text appended to the message
    pub fn push(&mut self, delta: &ToolCallDelta) -> String {
        let mut appended = String::new();

        if self.state == CallState::Closed {
            tracing::warn!("Tool-call delta received after the call was closed; ignoring");
            return appended;
        }

        if let Some(name) = &delta.name
            && self.state == CallState::Idle
        {
            let quoted = Value::String(name.clone()).to_string();
            appended.push_str(&format!("{{\"name\":{},\"arguments\":", quoted));
            self.state = CallState::Open;
        }

        if let Some(arguments) = &delta.arguments {
            if self.state == CallState::Idle {
                tracing::debug!("Argument delta before function name; ignoring");
            } else {
                appended.push_str(arguments);
            }
        }

        self.text.push_str(&appended);
        appended
    }

    /// Close the JSON object, returning the text appended to the message
    ///
    /// Returns an empty string if no call was opened or it is already closed.
    pub fn close(&mut self) -> String {
        if self.state != CallState::Open {
            return String::new();
        }
        self.state = CallState::Closed;
        self.text.push('}');
        "}".to_string()
    }

    pub fn is_open(&self) -> bool {
        self.state == CallState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == CallState::Closed
    }

    /// Raw accumulated text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parse the accumulated text into a [`FunctionCall`]
    pub fn parse(&self) -> Result<FunctionCall, serde_json::Error> {
        serde_json::from_str(&self.text)
    }
}
