//! chatstitch - Streaming chat response reconciler
//!
//! This library consumes a server-sent-event chat completion stream and
//! reconciles it into the last message of an immutable conversation,
//! handling out-of-order fragments, tool-call deltas, metadata state,
//! cooperative cancellation and finalization hooks.

pub mod cancel;
pub mod cli;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod request;
pub mod request_id;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod updater;
