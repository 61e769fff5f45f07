//! Incremental response assembly
//!
//! Owns every piece of per-stream state: the classifier, directly appended
//! text, the reassembly buffer, the function-call buffer and merged metadata
//! state. Created per send and dropped with it.
//!
//! In out-of-order mode, text without a usable sequence tag and generated
//! function-call text go to a separate unsequenced lane rendered after the
//! reassembled run. Server sequence numbers are never assigned locally, so a
//! late tagged fragment can't lose its slot to locally generated text.

use super::classifier::{Classified, Classifier};
use super::event::{StreamEvent, StreamMode, TOOL_CALLS_FINISH};
use super::function_call::FunctionCallBuffer;
use super::reassembly::{OrderedFragment, ReassemblyBuffer};
use serde_json::{Map, Value};

/// Observable result of applying one event
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Visible content changed and should be published
    Updated,
    /// Merged state changed and should be published
    StateChanged,
    Status(Value),
    Mode(StreamMode),
    /// Code-interpreter data replaced; publish it with the current content
    CodeInterpreter(Value),
    /// The turn is complete; the stream should be closed
    Finished(String),
    /// Nothing observable changed
    Unchanged,
}

/// Per-stream response state
#[derive(Debug, Default)]
pub struct ResponseAssembly {
    classifier: Classifier,
    direct: String,
    fragments: ReassemblyBuffer,
    unsequenced: String,
    function_call: FunctionCallBuffer,
    state: Option<Value>,
    duplicate_fragments: usize,
}

impl ResponseAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed merged state from an existing message (e.g. a resumed turn)
    pub fn with_state(mut self, state: Option<Value>) -> Self {
        self.state = state;
        self
    }

    pub fn apply(&mut self, event: StreamEvent) -> Effect {
        match self.classifier.classify(event) {
            Classified::Status(status) => Effect::Status(status),
            Classified::ModeSwitch(mode) => Effect::Mode(mode),
            Classified::StateMerge(incoming) => {
                self.merge_state(incoming);
                Effect::StateChanged
            }
            Classified::StateReset(state) => {
                self.state = Some(state);
                Effect::StateChanged
            }
            Classified::CodeInterpreter(data) => Effect::CodeInterpreter(data),
            Classified::Text(text) => {
                if text.is_empty() {
                    return Effect::Unchanged;
                }
                self.direct.push_str(&text);
                Effect::Updated
            }
            Classified::Fragment {
                sequence: Some(sequence),
                data,
            } => self.record_fragment(OrderedFragment::new(sequence, data)),
            Classified::Fragment {
                sequence: None,
                data,
            } => self.append_unsequenced(&data),
            Classified::ToolCall(delta) => {
                let appended = self.function_call.push(&delta);
                self.append_generated(appended)
            }
            Classified::Finish(reason) => {
                if reason == TOOL_CALLS_FINISH {
                    let closing = self.function_call.close();
                    self.append_generated(closing);
                }
                Effect::Finished(reason)
            }
            Classified::Ignored => Effect::Unchanged,
        }
    }

    /// Visible text: direct deltas, the reassembled fragments, then the
    /// unsequenced lane
    pub fn content(&self) -> String {
        let mut content = self.direct.clone();
        if !self.fragments.is_empty() {
            content.push_str(&self.fragments.get_text());
        }
        content.push_str(&self.unsequenced);
        content
    }

    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    pub fn is_out_of_order(&self) -> bool {
        self.classifier.is_out_of_order()
    }

    pub fn function_call(&self) -> &FunctionCallBuffer {
        &self.function_call
    }

    pub fn fragments(&self) -> &ReassemblyBuffer {
        &self.fragments
    }

    pub fn duplicate_fragments(&self) -> usize {
        self.duplicate_fragments
    }

    /// `Updated` only when the fragment joined the rendered run
    fn record_fragment(&mut self, fragment: OrderedFragment) -> Effect {
        let visible = self.fragments.visible_len();
        if !self.fragments.add_event(fragment) {
            self.duplicate_fragments += 1;
            return Effect::Unchanged;
        }
        if self.fragments.visible_len() == visible {
            // Held behind a gap
            return Effect::Unchanged;
        }
        Effect::Updated
    }

    fn append_unsequenced(&mut self, text: &str) -> Effect {
        if text.is_empty() {
            return Effect::Unchanged;
        }
        self.unsequenced.push_str(text);
        Effect::Updated
    }

    fn append_generated(&mut self, text: String) -> Effect {
        if self.classifier.is_out_of_order() {
            return self.append_unsequenced(&text);
        }
        if text.is_empty() {
            return Effect::Unchanged;
        }
        self.direct.push_str(&text);
        Effect::Updated
    }

    /// Shallow merge: incoming keys overwrite existing ones
    fn merge_state(&mut self, incoming: Map<String, Value>) {
        if let Some(Value::Object(existing)) = self.state.as_mut() {
            existing.extend(incoming);
            return;
        }
        self.state = Some(Value::Object(incoming));
    }
}
