//! Wire payloads and the tagged event type they decode into
//!
//! Each SSE frame's `data` field is a JSON object with optional keys:
//!
//! | key | meaning |
//! |---|---|
//! | `s` | source tag: `"meta"` for metadata, otherwise a sequence number |
//! | `d` | delta: a text string or `{ "tool_calls": [...], "finish_reason": ... }` |
//! | `st` | status payload (metadata only) |
//! | `m` | mode name, e.g. `"out_of_order"` (metadata only) |
//! | `state` | incremental state to merge (metadata only) |
//! | `stateReset` | state replacing everything merged so far (metadata only) |
//! | `codeInterpreterMessageData` | code-interpreter output attached to the reply (metadata only) |
//!
//! [`WirePayload::into_event`] performs the one-time classification.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Source tag marking a metadata frame
pub const META_SOURCE: &str = "meta";

/// Literal payload terminating a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Finish reason that closes an in-progress function call
pub const TOOL_CALLS_FINISH: &str = "tool_calls";

/// Raw JSON payload of a single SSE frame
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WirePayload {
    #[serde(default, deserialize_with = "tag_as_string")]
    pub s: Option<String>,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default)]
    pub st: Option<Value>,
    #[serde(default)]
    pub m: Option<String>,
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default, rename = "stateReset")]
    pub state_reset: Option<Value>,
    #[serde(default, rename = "codeInterpreterMessageData")]
    pub code_interpreter: Option<Value>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Accept the source tag as either a JSON string or a number
fn tag_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(tag)) => Some(tag),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Stream mode announced by a metadata frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMode {
    /// Text deltas carry sequence tags and must be reassembled
    OutOfOrder,
    /// Any mode this client does not act on
    Other(String),
}

impl StreamMode {
    pub fn parse(name: &str) -> Self {
        match name {
            "out_of_order" => Self::OutOfOrder,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::OutOfOrder => "out_of_order",
            Self::Other(name) => name,
        }
    }
}

/// Metadata carried by a `s: "meta"` frame
#[derive(Debug, Clone, PartialEq)]
pub enum MetaEvent {
    Status(Value),
    Mode(StreamMode),
    StateMerge(Map<String, Value>),
    StateReset(Value),
    /// Replaces the code-interpreter data on the assistant message
    CodeInterpreter(Value),
}

/// A single tool-call delta
///
/// The backend streams the function name once, then argument text in pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// A classified stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Meta(MetaEvent),
    /// Text delta; `source` is the raw `s` tag, if any
    Text {
        source: Option<String>,
        text: String,
    },
    ToolCall(ToolCallDelta),
    Finish {
        reason: String,
    },
    /// Recognized JSON with nothing this client acts on
    Ignored,
}

impl WirePayload {
    /// Classify the payload
    ///
    /// Precedence: metadata, string delta, tool-call delta, finish signal.
    pub fn into_event(self) -> StreamEvent {
        if self.s.as_deref() == Some(META_SOURCE) {
            return classify_meta(self);
        }

        let finish_reason = self.finish_reason;
        match self.d {
            Some(Value::String(text)) => StreamEvent::Text {
                source: self.s,
                text,
            },
            Some(Value::Object(delta)) => classify_structured(delta, finish_reason),
            _ => match finish_reason {
                Some(reason) => StreamEvent::Finish { reason },
                None => StreamEvent::Ignored,
            },
        }
    }
}

fn classify_meta(payload: WirePayload) -> StreamEvent {
    if let Some(status) = payload.st {
        return StreamEvent::Meta(MetaEvent::Status(status));
    }
    if let Some(mode) = payload.m {
        return StreamEvent::Meta(MetaEvent::Mode(StreamMode::parse(&mode)));
    }
    if let Some(reset) = payload.state_reset {
        return StreamEvent::Meta(MetaEvent::StateReset(reset));
    }
    if let Some(data) = payload.code_interpreter.filter(|data| !data.is_null()) {
        return StreamEvent::Meta(MetaEvent::CodeInterpreter(data));
    }
    match payload.state {
        Some(Value::Object(state)) => StreamEvent::Meta(MetaEvent::StateMerge(state)),
        Some(other) => {
            tracing::debug!(state = %other, "Ignoring non-object state merge");
            StreamEvent::Ignored
        }
        None => StreamEvent::Ignored,
    }
}

fn classify_structured(
    mut delta: Map<String, Value>,
    outer_finish: Option<String>,
) -> StreamEvent {
    if let Some(Value::Array(calls)) = delta.get("tool_calls")
        && let Some(call) = calls.first()
    {
        let function = call.get("function").unwrap_or(call);
        let name = function
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let arguments = function
            .get("arguments")
            .and_then(Value::as_str)
            .map(str::to_string);
        return StreamEvent::ToolCall(ToolCallDelta { name, arguments });
    }

    let finish = match delta.remove("finish_reason") {
        Some(Value::String(reason)) => Some(reason),
        _ => outer_finish,
    };
    match finish {
        Some(reason) => StreamEvent::Finish { reason },
        None => StreamEvent::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> StreamEvent {
        serde_json::from_value::<WirePayload>(value)
            .expect("payload should deserialize")
            .into_event()
    }

    #[test]
    fn test_plain_text_delta() {
        assert_eq!(
            decode(json!({"d": "Hello"})),
            StreamEvent::Text {
                source: None,
                text: "Hello".to_string()
            }
        );
    }

    #[test]
    fn test_source_tagged_text_keeps_tag() {
        assert_eq!(
            decode(json!({"s": "3", "d": "x"})),
            StreamEvent::Text {
                source: Some("3".to_string()),
                text: "x".to_string()
            }
        );
    }

    #[test]
    fn test_numeric_source_tag_is_accepted() {
        assert_eq!(
            decode(json!({"s": 7, "d": "x"})),
            StreamEvent::Text {
                source: Some("7".to_string()),
                text: "x".to_string()
            }
        );
    }

    #[test]
    fn test_meta_takes_precedence_over_delta() {
        let event = decode(json!({"s": "meta", "m": "out_of_order", "d": "ignored"}));
        assert_eq!(event, StreamEvent::Meta(MetaEvent::Mode(StreamMode::OutOfOrder)));
    }

    #[test]
    fn test_meta_status() {
        let event = decode(json!({"s": "meta", "st": {"summary": "Searching"}}));
        assert_eq!(
            event,
            StreamEvent::Meta(MetaEvent::Status(json!({"summary": "Searching"})))
        );
    }

    #[test]
    fn test_meta_state_merge_and_reset() {
        let merge = decode(json!({"s": "meta", "state": {"step": 1}}));
        assert!(matches!(merge, StreamEvent::Meta(MetaEvent::StateMerge(ref m)) if m["step"] == 1));

        let reset = decode(json!({"s": "meta", "stateReset": {"step": 0}}));
        assert_eq!(
            reset,
            StreamEvent::Meta(MetaEvent::StateReset(json!({"step": 0})))
        );
    }

    #[test]
    fn test_meta_code_interpreter_data() {
        let event = decode(json!({
            "s": "meta",
            "codeInterpreterMessageData": {"files": [{"name": "plot.png"}]}
        }));
        assert_eq!(
            event,
            StreamEvent::Meta(MetaEvent::CodeInterpreter(
                json!({"files": [{"name": "plot.png"}]})
            ))
        );

        // A null payload carries nothing to attach
        let empty = decode(json!({"s": "meta", "codeInterpreterMessageData": null}));
        assert_eq!(empty, StreamEvent::Ignored);
    }

    #[test]
    fn test_unknown_mode_is_preserved() {
        let event = decode(json!({"s": "meta", "m": "agent"}));
        assert_eq!(
            event,
            StreamEvent::Meta(MetaEvent::Mode(StreamMode::Other("agent".to_string())))
        );
    }

    #[test]
    fn test_tool_call_delta_with_name() {
        let event = decode(json!({
            "d": {"tool_calls": [{"function": {"name": "lookup", "arguments": ""}}]}
        }));
        assert_eq!(
            event,
            StreamEvent::ToolCall(ToolCallDelta {
                name: Some("lookup".to_string()),
                arguments: Some(String::new()),
            })
        );
    }

    #[test]
    fn test_tool_call_delta_arguments_only() {
        let event = decode(json!({
            "d": {"tool_calls": [{"function": {"arguments": "{\"q\":"}}]}
        }));
        assert_eq!(
            event,
            StreamEvent::ToolCall(ToolCallDelta {
                name: None,
                arguments: Some("{\"q\":".to_string()),
            })
        );
    }

    #[test]
    fn test_finish_reason_in_delta_or_top_level() {
        assert_eq!(
            decode(json!({"d": {"finish_reason": "tool_calls"}})),
            StreamEvent::Finish {
                reason: "tool_calls".to_string()
            }
        );
        assert_eq!(
            decode(json!({"finish_reason": "stop"})),
            StreamEvent::Finish {
                reason: "stop".to_string()
            }
        );
    }

    #[test]
    fn test_unrecognized_payload_is_ignored() {
        assert_eq!(decode(json!({"x": 1})), StreamEvent::Ignored);
        assert_eq!(decode(json!({"d": {"role": "assistant"}})), StreamEvent::Ignored);
        assert_eq!(decode(json!({"s": "meta"})), StreamEvent::Ignored);
    }
}
