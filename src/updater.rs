//! Message publication and finalization
//!
//! The surrounding application is reached only through injected
//! collaborators:
//! - [`StreamObserver`] receives every published conversation snapshot plus
//!   status, mode, state and flag notifications
//! - [`PostProcessor`]s observe the final text of a completed response
//! - [`ContentTransforms`] may rewrite the final text based on conversation tags
//! - [`ConversationStore`] persists the conversation when the stream ends

use crate::conversation::{Conversation, ConversationMessage, Role};
use crate::error::{AppError, AppResult};
use crate::stream::StreamMode;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Receives progress from a running send
///
/// Every method has a no-op default.
pub trait StreamObserver: Send {
    /// A new conversation snapshot with an updated last message
    fn on_publish(&mut self, _conversation: &Conversation) {}

    /// Raw status metadata, for display only
    fn on_status(&mut self, _status: &Value) {}

    /// Transient status should no longer be shown
    fn on_status_cleared(&mut self) {}

    fn on_mode(&mut self, _mode: &StreamMode) {}

    /// Merged metadata state after a merge or reset
    fn on_state(&mut self, _state: &Value) {}

    /// True until the first content is published
    fn on_loading_changed(&mut self, _loading: bool) {}

    fn on_streaming_changed(&mut self, _streaming: bool) {}

    /// An error the user should be told about
    fn on_error(&mut self, _error: &AppError) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Read-only hook run over the final text of a completed response
pub trait PostProcessor: Send + Sync {
    fn process(&self, final_text: &str, conversation: &Conversation);
}

impl<F> PostProcessor for F
where
    F: Fn(&str, &Conversation) + Send + Sync,
{
    fn process(&self, final_text: &str, conversation: &Conversation) {
        self(final_text, conversation)
    }
}

pub type ContentTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Tag-keyed final-content rewrites (e.g. workflow-specific post-processing)
#[derive(Clone, Default)]
pub struct ContentTransforms {
    by_tag: HashMap<String, ContentTransform>,
}

impl ContentTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, tag: impl Into<String>, transform: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.by_tag.insert(tag.into(), Arc::new(transform));
    }

    /// Transform for the first of `tags` that has one registered
    pub fn for_tags(&self, tags: &[String]) -> Option<(&str, &ContentTransform)> {
        tags.iter().find_map(|tag| {
            self.by_tag
                .get_key_value(tag)
                .map(|(tag, transform)| (tag.as_str(), transform))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

impl std::fmt::Debug for ContentTransforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTransforms")
            .field("tags", &self.by_tag.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Finalization hooks shared by every send of a session
#[derive(Clone, Default)]
pub struct Hooks {
    pub post_processors: Vec<Arc<dyn PostProcessor>>,
    pub transforms: ContentTransforms,
}

impl Hooks {
    pub fn with_post_processor<P>(mut self, processor: P) -> Self
    where
        P: PostProcessor + 'static,
    {
        self.post_processors.push(Arc::new(processor));
        self
    }

    pub fn with_transforms(mut self, transforms: ContentTransforms) -> Self {
        self.transforms = transforms;
        self
    }
}

/// Where conversations are persisted when a stream ends
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save(&self, conversation: &Conversation) -> AppResult<()>;
}

/// In-memory store keeping every saved snapshot
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently saved snapshot
    pub async fn last_saved(&self) -> Option<Conversation> {
        self.saved.lock().await.last().cloned()
    }

    pub async fn save_count(&self) -> usize {
        self.saved.lock().await.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn save(&self, conversation: &Conversation) -> AppResult<()> {
        self.saved.lock().await.push(conversation.clone());
        Ok(())
    }
}

#[async_trait]
impl<S: ConversationStore + ?Sized> ConversationStore for Box<S> {
    async fn save(&self, conversation: &Conversation) -> AppResult<()> {
        (**self).save(conversation).await
    }
}

/// Writes each conversation to `<dir>/<id>.json`, replacing earlier saves
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File a conversation is saved to
    ///
    /// Characters outside `[A-Za-z0-9_-]` in the id are replaced with `_`.
    pub fn path_for(&self, conversation_id: &str) -> PathBuf {
        let stem: String = conversation_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", stem))
    }

    /// Read back a saved conversation
    pub async fn load(&self, conversation_id: &str) -> AppResult<Conversation> {
        let persistence_error = |reason: String| AppError::Persistence {
            conversation_id: conversation_id.to_string(),
            reason,
        };
        let path = self.path_for(conversation_id);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| persistence_error(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_slice(&raw)
            .map_err(|e| persistence_error(format!("decode {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn save(&self, conversation: &Conversation) -> AppResult<()> {
        let persistence_error = |reason: String| AppError::Persistence {
            conversation_id: conversation.id.clone(),
            reason,
        };
        let encoded = serde_json::to_vec_pretty(conversation)
            .map_err(|e| persistence_error(format!("encode: {}", e)))?;
        let path = self.path_for(&conversation.id);
        tokio::fs::write(&path, encoded)
            .await
            .map_err(|e| persistence_error(format!("write {}: {}", path.display(), e)))?;
        tracing::debug!(
            conversation_id = %conversation.id,
            path = %path.display(),
            "Conversation saved"
        );
        Ok(())
    }
}

/// Publishes replace-last snapshots of one conversation
pub struct MessageUpdater<'a, O: StreamObserver + ?Sized> {
    observer: &'a mut O,
    conversation: Conversation,
    publications: usize,
}

impl<'a, O: StreamObserver + ?Sized> MessageUpdater<'a, O> {
    /// Start updating `conversation`
    ///
    /// If the last message is not an assistant turn an empty assistant
    /// message is appended first; that message is the only live one.
    pub fn new(conversation: Conversation, observer: &'a mut O) -> Self {
        let has_live_message = conversation
            .last_message()
            .is_some_and(|last| last.role == Role::Assistant);
        let conversation = if has_live_message {
            conversation
        } else {
            conversation.append(ConversationMessage::assistant(""))
        };
        Self {
            observer,
            conversation,
            publications: 0,
        }
    }

    /// Replace the last message with updated content and state
    ///
    /// Side data already on the message (code interpreter output) is kept.
    pub fn publish(&mut self, content: String, state: Option<Value>) {
        let mut message = self
            .conversation
            .last_message()
            .cloned()
            .unwrap_or_else(|| ConversationMessage::assistant(""));
        message.content = content;
        message.data.state = state;

        self.conversation = self.conversation.replace_last(message);
        if self.publications == 0 {
            self.observer.on_loading_changed(false);
        }
        self.publications += 1;
        self.observer.on_publish(&self.conversation);
    }

    /// Attach code interpreter side data to the live message
    pub fn set_code_interpreter_data(&mut self, data: Value) {
        if let Some(last) = self.conversation.last_message() {
            let mut message = last.clone();
            message.data.code_interpreter_message_data = Some(data);
            self.conversation = self.conversation.replace_last(message);
        }
    }

    pub fn observer(&mut self) -> &mut O {
        &mut *self.observer
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn content(&self) -> &str {
        self.conversation
            .last_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn publications(&self) -> usize {
        self.publications
    }

    /// Run post-processors and the tag transform, then persist
    pub async fn complete(
        mut self,
        hooks: &Hooks,
        store: &dyn ConversationStore,
    ) -> AppResult<Conversation> {
        let final_text = self.content().to_string();
        for processor in &hooks.post_processors {
            processor.process(&final_text, &self.conversation);
        }

        if let Some((tag, transform)) = hooks.transforms.for_tags(&self.conversation.tags) {
            let transformed = transform(&final_text);
            if transformed != final_text {
                tracing::debug!(
                    conversation_id = %self.conversation.id,
                    tag = %tag,
                    "Content transform rewrote final response"
                );
                let state = self
                    .conversation
                    .last_message()
                    .and_then(|m| m.data.state.clone());
                self.publish(transformed, state);
            }
        }

        let result = store.save(&self.conversation).await;
        self.settle();
        result.map(|()| self.conversation)
    }

    /// Persist whatever was received before an abort or failure
    ///
    /// Partial content is kept. A failure to persist is logged, not returned,
    /// so the original termination cause is what the caller sees.
    pub async fn halt(
        mut self,
        store: &dyn ConversationStore,
        error: Option<&AppError>,
    ) -> Conversation {
        if let Err(e) = store.save(&self.conversation).await {
            tracing::error!(
                conversation_id = %self.conversation.id,
                error = %e,
                "Failed to persist partial conversation"
            );
        }
        if let Some(error) = error {
            self.observer.on_error(error);
        }
        self.settle();
        self.conversation
    }

    fn settle(&mut self) {
        self.observer.on_loading_changed(false);
        self.observer.on_streaming_changed(false);
        self.observer.on_status_cleared();
    }
}
