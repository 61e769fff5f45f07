//! SSE stream reader
//!
//! Turns a byte stream into classified [`StreamEvent`]s using
//! `eventsource-stream` for framing (line buffering and UTF-8 boundaries).
//! The [`CancelGate`] is consulted after every frame arrives and before it is
//! handled; a pending read also races the gate's token.

use super::event::{DONE_SENTINEL, StreamEvent, WirePayload};
use crate::cancel::CancelGate;
use crate::error::{AppError, AppResult};
use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;

/// Maximum number of characters of a bad frame quoted in errors
const PREVIEW_CHARS: usize = 80;

type FrameStream<E> = Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<E>>> + Send>>;

/// One step of reading
#[derive(Debug, Clone, PartialEq)]
pub enum ReadItem {
    Event(StreamEvent),
    /// The `[DONE]` sentinel was received
    Done,
    /// The underlying stream ended without a sentinel
    End,
    /// The cancellation gate tripped; the frame that was in flight was dropped
    Aborted,
}

pub struct EventReader<E> {
    frames: Option<FrameStream<E>>,
    gate: CancelGate,
    frames_received: usize,
    bytes_received: usize,
}

impl<E> EventReader<E>
where
    E: Display + Send + 'static,
{
    pub fn new<S>(bytes: S, gate: CancelGate) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    {
        Self {
            frames: Some(Box::pin(bytes.eventsource())),
            gate,
            frames_received: 0,
            bytes_received: 0,
        }
    }

    /// Read until the next actionable item
    ///
    /// Empty frames are skipped. After `Done`, `End`, `Aborted` or an error the
    /// body stream has been dropped and every later call returns `End`.
    pub async fn next(&mut self) -> AppResult<ReadItem> {
        loop {
            let Some(frames) = self.frames.as_mut() else {
                return Ok(ReadItem::End);
            };

            let item = tokio::select! {
                biased;
                _ = self.gate.aborted() => None,
                item = frames.next() => Some(item),
            };

            // Cooperative check between reads, before anything is handled.
            let item = match item {
                Some(item) if !self.gate.should_abort() => item,
                _ => {
                    self.release("aborted");
                    return Ok(ReadItem::Aborted);
                }
            };

            let event = match item {
                None => {
                    self.release("ended");
                    return Ok(ReadItem::End);
                }
                Some(Err(e)) => {
                    let err = AppError::StreamInterrupted {
                        bytes_received: self.bytes_received,
                        frames_received: self.frames_received,
                        reason: e.to_string(),
                    };
                    self.release("interrupted");
                    return Err(err);
                }
                Some(Ok(event)) => event,
            };

            let frame_index = self.frames_received;
            self.frames_received += 1;
            self.bytes_received += event.data.len();

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_SENTINEL {
                self.release("done");
                return Ok(ReadItem::Done);
            }

            match serde_json::from_str::<WirePayload>(data) {
                Ok(payload) => {
                    let event = payload.into_event();
                    tracing::trace!(frame_index, event = ?event, "Stream frame classified");
                    return Ok(ReadItem::Event(event));
                }
                Err(e) => {
                    let err = AppError::StreamParse {
                        frame_index,
                        reason: e.to_string(),
                        preview: data.chars().take(PREVIEW_CHARS).collect(),
                    };
                    self.release("parse_error");
                    return Err(err);
                }
            }
        }
    }

    pub fn frames_received(&self) -> usize {
        self.frames_received
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    /// Drop the body stream, closing the connection
    fn release(&mut self, reason: &'static str) {
        if self.frames.take().is_some() {
            tracing::debug!(
                reason,
                frames = self.frames_received,
                bytes = self.bytes_received,
                "Released response stream"
            );
        }
    }
}
