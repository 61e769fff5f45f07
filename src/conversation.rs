//! Conversation model
//!
//! A [`Conversation`] is treated as immutable: every update returns a new
//! conversation. Messages are shared through `Arc`, so after
//! [`Conversation::replace_last`] every other message is still the same
//! allocation (`Arc::ptr_eq`) and observers can detect changes cheaply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Side data attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_interpreter_message_data: Option<Value>,
}

impl MessageData {
    fn is_empty(&self) -> bool {
        self.state.is_none() && self.code_interpreter_message_data.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "MessageData::is_empty")]
    pub data: MessageData,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            data: MessageData::default(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Tags select content transforms applied when a response completes
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub messages: Vec<Arc<ConversationMessage>>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// New conversation with `message` appended
    pub fn append(&self, message: ConversationMessage) -> Self {
        let mut messages = self.messages.clone();
        messages.push(Arc::new(message));
        Self {
            messages,
            ..self.shallow()
        }
    }

    /// New conversation whose last message is `message`
    ///
    /// Appends when the conversation is empty. All other messages are shared
    /// with `self`.
    pub fn replace_last(&self, message: ConversationMessage) -> Self {
        let mut messages = self.messages.clone();
        match messages.last_mut() {
            Some(last) => *last = Arc::new(message),
            None => messages.push(Arc::new(message)),
        }
        Self {
            messages,
            ..self.shallow()
        }
    }

    pub fn last_message(&self) -> Option<&ConversationMessage> {
        self.messages.last().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn shallow(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            tags: self.tags.clone(),
            messages: Vec::new(),
        }
    }
}
