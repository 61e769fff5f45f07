//! Per-send orchestration
//!
//! [`ChatSession::send`] builds the request body, opens the stream and hands
//! the body to the [`Reconciler`]. Everything per-stream is created inside
//! that call and dropped when it returns.

use crate::cancel::CancelGate;
use crate::client::{ByteStream, ChatClient};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::error::AppResult;
use crate::metrics::{Metrics, Outcome};
use crate::reconciler::{Reconciler, Termination};
use crate::request::{ChatRequestBody, DataSource};
use crate::request_id::RequestId;
use crate::updater::{ConversationStore, Hooks, StreamObserver};
use serde_json::{Map, Value};
use std::time::Instant;

/// Result of one send
#[derive(Debug)]
pub struct SendOutcome {
    pub request_id: RequestId,
    pub conversation: Conversation,
    pub termination: Termination,
}

/// Extra request fields for one send
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub request_id: Option<RequestId>,
    pub data_sources: Vec<DataSource>,
    /// Passthrough properties merged into `options` (e.g. `assistantId`)
    pub vendor: Map<String, Value>,
}

pub struct ChatSession<S> {
    client: ChatClient,
    config: Config,
    store: S,
    hooks: Hooks,
    metrics: Option<Metrics>,
}

impl<S: ConversationStore> ChatSession<S> {
    pub fn new(client: ChatClient, config: Config, store: S) -> Self {
        Self {
            client,
            config,
            store,
            hooks: Hooks::default(),
            metrics: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Send `conversation` (whose last message is the user turn) and stream
    /// the reply into a new assistant message
    pub async fn send<O>(
        &self,
        conversation: &Conversation,
        gate: CancelGate,
        observer: &mut O,
    ) -> AppResult<SendOutcome>
    where
        O: StreamObserver + ?Sized,
    {
        self.send_with(conversation, SendOptions::default(), gate, observer)
            .await
    }

    /// [`send`](Self::send) with explicit request options
    ///
    /// Supplying `options.request_id` lets the caller issue a kill request
    /// for this send while it is still streaming.
    ///
    /// # Errors
    ///
    /// Request validation, transport and non-2xx errors are returned before
    /// any stream processing starts; the observer has already been told and
    /// its flags reset. Once streaming, only a failed final persist is an
    /// error; aborts and mid-stream failures are reported in
    /// [`SendOutcome::termination`].
    pub async fn send_with<O>(
        &self,
        conversation: &Conversation,
        options: SendOptions,
        gate: CancelGate,
        observer: &mut O,
    ) -> AppResult<SendOutcome>
    where
        O: StreamObserver + ?Sized,
    {
        let request_id = options.request_id.unwrap_or_default();
        let started = Instant::now();

        observer.on_loading_changed(true);
        observer.on_streaming_changed(true);

        let stream = match self.open(conversation, options, request_id).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    conversation_id = %conversation.id,
                    error = %e,
                    "Chat request failed before streaming"
                );
                observer.on_error(&e);
                observer.on_loading_changed(false);
                observer.on_streaming_changed(false);
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                if let Some(metrics) = &self.metrics
                    && let Err(me) = metrics.record_termination(Outcome::HttpError, elapsed_ms)
                {
                    tracing::warn!(error = %me, "Failed to record stream termination metric");
                }
                return Err(e);
            }
        };

        tracing::info!(
            request_id = %request_id,
            conversation_id = %conversation.id,
            "Streaming chat response"
        );

        let mut reconciler = Reconciler::new(&self.store, &self.hooks);
        if let Some(metrics) = &self.metrics {
            reconciler = reconciler.with_metrics(metrics);
        }
        let reconciled = reconciler
            .run(stream, conversation.clone(), gate, observer)
            .await?;

        Ok(SendOutcome {
            request_id,
            conversation: reconciled.conversation,
            termination: reconciled.termination,
        })
    }

    async fn open(
        &self,
        conversation: &Conversation,
        options: SendOptions,
        request_id: RequestId,
    ) -> AppResult<ByteStream> {
        let mut body =
            ChatRequestBody::from_conversation(conversation, &self.config.chat, request_id)?
                .with_data_sources(options.data_sources);
        for (key, value) in options.vendor {
            body = body.with_vendor_option(key, value)?;
        }
        self.client.open_stream(&body).await
    }

    /// Ask the backend to stop generating for an in-flight request
    pub async fn kill(&self, request_id: RequestId) -> AppResult<()> {
        self.client.kill_request(request_id).await
    }
}
