//! Mode-aware event classification
//!
//! [`Classifier`] tracks whether the stream has switched to out-of-order mode
//! and, once it has, turns every text delta into a sequenced fragment.

use super::event::{MetaEvent, StreamEvent, StreamMode, ToolCallDelta};
use serde_json::{Map, Value};

/// What the assembler should do with one event
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Status(Value),
    ModeSwitch(StreamMode),
    StateMerge(Map<String, Value>),
    StateReset(Value),
    CodeInterpreter(Value),
    /// Append directly to the message text
    Text(String),
    /// Record in the reassembly buffer; `sequence` is `None` when the tag was
    /// missing or not numeric
    Fragment {
        sequence: Option<i64>,
        data: String,
    },
    ToolCall(ToolCallDelta),
    Finish(String),
    Ignored,
}

/// Per-stream classifier state
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    out_of_order: bool,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_out_of_order(&self) -> bool {
        self.out_of_order
    }

    pub fn classify(&mut self, event: StreamEvent) -> Classified {
        match event {
            StreamEvent::Meta(MetaEvent::Status(status)) => Classified::Status(status),
            StreamEvent::Meta(MetaEvent::Mode(mode)) => {
                if mode == StreamMode::OutOfOrder && !self.out_of_order {
                    tracing::debug!("Stream switched to out-of-order mode");
                    self.out_of_order = true;
                }
                Classified::ModeSwitch(mode)
            }
            StreamEvent::Meta(MetaEvent::StateMerge(state)) => Classified::StateMerge(state),
            StreamEvent::Meta(MetaEvent::StateReset(state)) => Classified::StateReset(state),
            StreamEvent::Meta(MetaEvent::CodeInterpreter(data)) => {
                Classified::CodeInterpreter(data)
            }
            StreamEvent::Text { source, text } if self.out_of_order => {
                let sequence = source.as_deref().and_then(|tag| tag.trim().parse::<i64>().ok());
                if sequence.is_none() {
                    tracing::debug!(
                        source = ?source,
                        "Out-of-order text without a numeric sequence tag"
                    );
                }
                Classified::Fragment {
                    sequence,
                    data: text,
                }
            }
            StreamEvent::Text { text, .. } => Classified::Text(text),
            StreamEvent::ToolCall(delta) => Classified::ToolCall(delta),
            StreamEvent::Finish { reason } => Classified::Finish(reason),
            StreamEvent::Ignored => Classified::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(source: Option<&str>, text: &str) -> StreamEvent {
        StreamEvent::Text {
            source: source.map(str::to_string),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_text_passes_through_in_normal_mode() {
        let mut classifier = Classifier::new();
        assert_eq!(
            classifier.classify(text(Some("4"), "hi")),
            Classified::Text("hi".to_string())
        );
    }

    #[test]
    fn test_out_of_order_switch_wraps_following_text() {
        let mut classifier = Classifier::new();
        classifier.classify(StreamEvent::Meta(MetaEvent::Mode(StreamMode::OutOfOrder)));
        assert!(classifier.is_out_of_order());

        assert_eq!(
            classifier.classify(text(Some("1"), "World")),
            Classified::Fragment {
                sequence: Some(1),
                data: "World".to_string()
            }
        );
        assert_eq!(
            classifier.classify(text(None, "x")),
            Classified::Fragment {
                sequence: None,
                data: "x".to_string()
            }
        );
    }

    #[test]
    fn test_other_mode_does_not_enable_reassembly() {
        let mut classifier = Classifier::new();
        let classified =
            classifier.classify(StreamEvent::Meta(MetaEvent::Mode(StreamMode::parse("agent"))));
        assert!(matches!(classified, Classified::ModeSwitch(StreamMode::Other(_))));
        assert!(!classifier.is_out_of_order());
    }

    #[test]
    fn test_non_numeric_tag_yields_untagged_fragment() {
        let mut classifier = Classifier::new();
        classifier.classify(StreamEvent::Meta(MetaEvent::Mode(StreamMode::OutOfOrder)));
        assert_eq!(
            classifier.classify(text(Some("abc"), "y")),
            Classified::Fragment {
                sequence: None,
                data: "y".to_string()
            }
        );
    }
}
