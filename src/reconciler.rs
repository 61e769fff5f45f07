//! Stream reconciliation loop
//!
//! Drives one response stream from first byte to final persist:
//! read an event, apply it to the [`ResponseAssembly`], publish the new
//! snapshot, repeat. Independent of HTTP so any byte stream can be fed in.

use crate::cancel::CancelGate;
use crate::conversation::Conversation;
use crate::error::{AppError, AppResult};
use crate::metrics::{FrameKind, Metrics, Outcome};
use crate::stream::{Effect, EventReader, ReadItem, ResponseAssembly, StreamEvent};
use crate::updater::{ConversationStore, Hooks, MessageUpdater, StreamObserver};
use bytes::Bytes;
use futures::Stream;
use std::fmt::Display;
use std::time::Instant;

/// How a stream ended
#[derive(Debug)]
pub enum Termination {
    /// `[DONE]`, a finish signal, or end of body
    Completed { finish_reason: Option<String> },
    /// The cancellation gate tripped; partial content was kept
    Aborted,
    /// Parse error or transport failure mid-stream; partial content was kept
    Failed(AppError),
}

impl Termination {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    fn outcome(&self) -> Outcome {
        match self {
            Self::Completed { .. } => Outcome::Completed,
            Self::Aborted => Outcome::Aborted,
            Self::Failed(AppError::StreamParse { .. }) => Outcome::ParseError,
            Self::Failed(_) => Outcome::Interrupted,
        }
    }
}

/// Final conversation plus how the stream ended
#[derive(Debug)]
pub struct Reconciled {
    pub conversation: Conversation,
    pub termination: Termination,
    pub frames_received: usize,
    pub bytes_received: usize,
}

/// Shared collaborators for reconciling streams
pub struct Reconciler<'a> {
    store: &'a dyn ConversationStore,
    hooks: &'a Hooks,
    metrics: Option<&'a Metrics>,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn ConversationStore, hooks: &'a Hooks) -> Self {
        Self {
            store,
            hooks,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: &'a Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume `body` into the last message of `conversation`
    ///
    /// Returns `Ok` for completed, aborted and failed streams alike; the
    /// termination says which. `Err` is only returned when persisting a
    /// completed response fails.
    pub async fn run<S, E, O>(
        &self,
        body: S,
        conversation: Conversation,
        gate: CancelGate,
        observer: &mut O,
    ) -> AppResult<Reconciled>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
        O: StreamObserver + ?Sized,
    {
        let started = Instant::now();
        let conversation_id = conversation.id.clone();
        let seed_state = conversation
            .last_message()
            .filter(|m| m.role == crate::conversation::Role::Assistant)
            .and_then(|m| m.data.state.clone());

        let mut reader = EventReader::new(body, gate);
        let mut assembly = ResponseAssembly::new().with_state(seed_state);
        let mut updater = MessageUpdater::new(conversation, observer);

        let termination = loop {
            let event = match reader.next().await {
                Ok(ReadItem::Event(event)) => event,
                Ok(ReadItem::Done) | Ok(ReadItem::End) => {
                    break Termination::Completed {
                        finish_reason: None,
                    };
                }
                Ok(ReadItem::Aborted) => break Termination::Aborted,
                Err(e) => break Termination::Failed(e),
            };

            let kind = frame_kind(&event, assembly.is_out_of_order());
            let duplicates = assembly.duplicate_fragments();
            let effect = assembly.apply(event);
            self.record_frame(kind, assembly.duplicate_fragments() > duplicates);

            match effect {
                Effect::Updated => {
                    updater.publish(assembly.content(), assembly.state().cloned());
                }
                Effect::StateChanged => {
                    if let Some(state) = assembly.state() {
                        updater.observer().on_state(state);
                    }
                    updater.publish(assembly.content(), assembly.state().cloned());
                }
                Effect::Status(status) => updater.observer().on_status(&status),
                Effect::Mode(mode) => updater.observer().on_mode(&mode),
                Effect::CodeInterpreter(data) => {
                    updater.set_code_interpreter_data(data);
                    updater.publish(assembly.content(), assembly.state().cloned());
                }
                Effect::Finished(reason) => {
                    if updater.content() != assembly.content() {
                        updater.publish(assembly.content(), assembly.state().cloned());
                    }
                    break Termination::Completed {
                        finish_reason: Some(reason),
                    };
                }
                Effect::Unchanged => {}
            }
        };
        // Dropping the reader releases the response body on every path.
        let frames_received = reader.frames_received();
        let bytes_received = reader.bytes_received();
        drop(reader);

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record_termination(&termination, duration_ms);

        let conversation = match &termination {
            Termination::Completed { finish_reason } => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    finish_reason = ?finish_reason,
                    frames = frames_received,
                    publications = updater.publications(),
                    duration_ms,
                    "Stream completed"
                );
                updater.complete(self.hooks, self.store).await?
            }
            Termination::Aborted => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    frames = frames_received,
                    "Stream aborted; keeping partial content"
                );
                updater.halt(self.store, None).await
            }
            Termination::Failed(error) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    frames = frames_received,
                    bytes = bytes_received,
                    error = %error,
                    "Stream failed; keeping partial content"
                );
                updater.halt(self.store, Some(error)).await
            }
        };

        Ok(Reconciled {
            conversation,
            termination,
            frames_received,
            bytes_received,
        })
    }

    fn record_frame(&self, kind: FrameKind, duplicate: bool) {
        let Some(metrics) = self.metrics else {
            return;
        };
        metrics.record_frame(kind);
        if kind == FrameKind::Fragment {
            metrics.record_fragment(duplicate);
        }
    }

    fn record_termination(&self, termination: &Termination, duration_ms: f64) {
        if let Some(metrics) = self.metrics
            && let Err(e) = metrics.record_termination(termination.outcome(), duration_ms)
        {
            tracing::warn!(error = %e, "Failed to record stream termination metric");
        }
    }
}

fn frame_kind(event: &StreamEvent, out_of_order: bool) -> FrameKind {
    match event {
        StreamEvent::Meta(_) => FrameKind::Meta,
        StreamEvent::Text { .. } if out_of_order => FrameKind::Fragment,
        StreamEvent::Text { .. } => FrameKind::Text,
        StreamEvent::ToolCall(_) => FrameKind::ToolCall,
        StreamEvent::Finish { .. } => FrameKind::Finish,
        StreamEvent::Ignored => FrameKind::Ignored,
    }
}
