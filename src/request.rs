//! Outbound chat request body
//!
//! Wire shape:
//!
//! ```json
//! {
//!   "model": "gpt-4o",
//!   "messages": [{"role": "system", "content": "..."}, {"role": "user", "content": "..."}],
//!   "temperature": 0.7,
//!   "max_tokens": 2048,
//!   "stream": true,
//!   "dataSources": [{"id": "s3://bucket/doc.pdf"}],
//!   "options": {
//!     "conversationId": "...", "timeZone": "UTC", "time": "...", "requestId": "...",
//!     "assistantId": "..."
//!   }
//! }
//! ```

use crate::config::ChatConfig;
use crate::conversation::{Conversation, ConversationMessage, Role};
use crate::error::{AppError, AppResult};
use crate::request_id::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message as sent on the wire (role and content only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&ConversationMessage> for WireMessage {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// A document or collection the backend should ground the answer in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub conversation_id: String,
    pub time_zone: String,
    pub time: String,
    pub request_id: RequestId,
    /// Vendor passthrough properties (`assistantId`, `rateLimit`, `accountId`, ...)
    #[serde(flatten)]
    pub vendor: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f64,
    #[serde(rename = "max_tokens")]
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_sources: Vec<DataSource>,
    pub options: RequestOptions,
}

impl ChatRequestBody {
    /// Build a streaming request for `conversation`
    ///
    /// The configured system prompt is prepended unless the conversation
    /// already starts with a system message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the conversation has no messages or
    /// its last message is not a user turn.
    pub fn from_conversation(
        conversation: &Conversation,
        chat: &ChatConfig,
        request_id: RequestId,
    ) -> AppResult<Self> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);

        let starts_with_system = conversation
            .messages
            .first()
            .is_some_and(|m| m.role == Role::System);
        if let Some(prompt) = chat.system_prompt()
            && !starts_with_system
        {
            messages.push(WireMessage {
                role: Role::System,
                content: prompt.to_string(),
            });
        }
        messages.extend(conversation.messages.iter().map(|m| WireMessage::from(m.as_ref())));

        let body = Self {
            model: chat.model().to_string(),
            messages,
            temperature: chat.temperature(),
            max_tokens: u32::try_from(chat.max_tokens()).map_err(|_| {
                AppError::Validation(format!("max_tokens {} exceeds u32", chat.max_tokens()))
            })?,
            stream: true,
            data_sources: Vec::new(),
            options: RequestOptions {
                conversation_id: conversation.id.clone(),
                time_zone: chat.time_zone().to_string(),
                time: chrono::Utc::now().to_rfc3339(),
                request_id,
                vendor: Map::new(),
            },
        };
        body.validate()?;
        Ok(body)
    }

    pub fn with_data_sources(mut self, sources: Vec<DataSource>) -> Self {
        self.data_sources = sources;
        self
    }

    /// Add a vendor passthrough property to `options`
    ///
    /// Keys that collide with the fixed option names are rejected.
    pub fn with_vendor_option(mut self, key: impl Into<String>, value: Value) -> AppResult<Self> {
        let key = key.into();
        if matches!(
            key.as_str(),
            "conversationId" | "timeZone" | "time" | "requestId"
        ) {
            return Err(AppError::Validation(format!(
                "vendor option '{}' would overwrite a reserved option",
                key
            )));
        }
        self.options.vendor.insert(key, value);
        Ok(self)
    }

    pub fn request_id(&self) -> RequestId {
        self.options.request_id
    }

    pub fn validate(&self) -> AppResult<()> {
        match self.messages.last() {
            None => Err(AppError::Validation(
                "messages must not be empty".to_string(),
            )),
            Some(last) if last.role != Role::User => Err(AppError::Validation(format!(
                "last message must be a user turn, got {:?}",
                last.role
            ))),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn chat_config(system_prompt: Option<&str>) -> ChatConfig {
        let prompt_line = system_prompt
            .map(|p| format!("system_prompt = \"{}\"\n", p))
            .unwrap_or_default();
        let toml = format!(
            "[client]\nbase_url = \"http://x\"\n[chat]\nmodel = \"m-1\"\nmax_tokens = 512\ntime_zone = \"Europe/Oslo\"\n{}",
            prompt_line
        );
        toml::from_str::<Config>(&toml)
            .expect("should parse test config")
            .chat
    }

    fn conversation() -> Conversation {
        Conversation::new("conv-9")
            .append(ConversationMessage::user("first"))
            .append(ConversationMessage::assistant("answer"))
            .append(ConversationMessage::user("second"))
    }

    #[test]
    fn test_body_wire_shape() {
        let id = RequestId::new();
        let body = ChatRequestBody::from_conversation(&conversation(), &chat_config(None), id)
            .unwrap()
            .with_data_sources(vec![DataSource::new("doc-1")])
            .with_vendor_option("assistantId", json!("astp-1"))
            .unwrap();

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "m-1");
        assert_eq!(value["max_tokens"], 512);
        assert_eq!(value["stream"], true);
        assert_eq!(value["messages"].as_array().unwrap().len(), 3);
        assert_eq!(value["dataSources"], json!([{"id": "doc-1"}]));
        assert_eq!(value["options"]["conversationId"], "conv-9");
        assert_eq!(value["options"]["timeZone"], "Europe/Oslo");
        assert_eq!(value["options"]["requestId"], id.to_string());
        assert_eq!(value["options"]["assistantId"], "astp-1");
        assert!(value["options"]["time"].is_string());
    }

    #[test]
    fn test_system_prompt_prepended_once() {
        let body = ChatRequestBody::from_conversation(
            &conversation(),
            &chat_config(Some("Be brief.")),
            RequestId::new(),
        )
        .unwrap();
        assert_eq!(body.messages[0].role, Role::System);
        assert_eq!(body.messages[0].content, "Be brief.");
        assert_eq!(body.messages.len(), 4);

        let with_system = Conversation::new("c")
            .append(ConversationMessage::system("Existing"))
            .append(ConversationMessage::user("q"));
        let body = ChatRequestBody::from_conversation(
            &with_system,
            &chat_config(Some("Be brief.")),
            RequestId::new(),
        )
        .unwrap();
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].content, "Existing");
    }

    #[test]
    fn test_empty_data_sources_are_omitted() {
        let body =
            ChatRequestBody::from_conversation(&conversation(), &chat_config(None), RequestId::new())
                .unwrap();
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("dataSources").is_none());
    }

    #[test]
    fn test_rejects_empty_conversation() {
        let err = ChatRequestBody::from_conversation(
            &Conversation::new("c"),
            &chat_config(None),
            RequestId::new(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_rejects_trailing_assistant_message() {
        let conversation = conversation().append(ConversationMessage::assistant(""));
        assert!(
            ChatRequestBody::from_conversation(&conversation, &chat_config(None), RequestId::new())
                .is_err()
        );
    }

    #[test]
    fn test_reserved_vendor_key_rejected() {
        let body =
            ChatRequestBody::from_conversation(&conversation(), &chat_config(None), RequestId::new())
                .unwrap();
        assert!(body.with_vendor_option("requestId", json!("x")).is_err());
    }
}
