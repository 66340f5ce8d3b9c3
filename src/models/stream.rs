#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Attachment, Conversation, Message};

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub conversation_id: Option<String>,
    pub config_id: String,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl StreamRequest {
    pub fn new(config_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationCreated {
    pub conversation: Conversation,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageSaved {
    pub message: Message,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageStart {
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageChunk {
    pub content: String,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageComplete {
    pub message_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawMessageError")]
pub struct MessageError {
    pub error: String,
    pub message_id: Option<String>,
}

/// Wire shape of `message_error` and the legacy `error` frame, which carries
/// its text in `message`.
#[derive(Deserialize)]
struct RawMessageError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
}

impl TryFrom<RawMessageError> for MessageError {
    type Error = String;

    fn try_from(raw: RawMessageError) -> std::result::Result<Self, Self::Error> {
        let error = raw
            .error
            .or(raw.message)
            .ok_or_else(|| "missing field `error`".to_string())?;
        Ok(Self {
            error,
            message_id: raw.message_id,
        })
    }
}

impl MessageError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TitleUpdated {
    pub conversation_id: String,
    pub title: String,
}

/// Typed frame of a chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ConversationCreated(ConversationCreated),
    MessageSaved(MessageSaved),
    MessageStart(MessageStart),
    MessageChunk(MessageChunk),
    MessageComplete(MessageComplete),
    MessageError(MessageError),
    TitleUpdated(TitleUpdated),
}

impl StreamEvent {
    /// Maps a frame type and its JSON payload onto the dispatch table.
    /// Unknown types yield `Ok(None)`; a payload missing required fields is
    /// an error.
    pub fn from_parts(kind: &str, data: Value) -> Result<Option<StreamEvent>> {
        let event = match kind {
            "conversation_created" => StreamEvent::ConversationCreated(
                serde_json::from_value(data).wrap_err("parsing conversation_created")?,
            ),
            "message_saved" => StreamEvent::MessageSaved(
                serde_json::from_value(data).wrap_err("parsing message_saved")?,
            ),
            "message_start" => StreamEvent::MessageStart(
                serde_json::from_value(data).wrap_err("parsing message_start")?,
            ),
            "message_chunk" => StreamEvent::MessageChunk(
                serde_json::from_value(data).wrap_err("parsing message_chunk")?,
            ),
            "message_complete" => StreamEvent::MessageComplete(
                serde_json::from_value(data).wrap_err("parsing message_complete")?,
            ),
            "message_error" | "error" => StreamEvent::MessageError(
                serde_json::from_value(data).wrap_err("parsing message_error")?,
            ),
            "title_updated" => StreamEvent::TitleUpdated(
                serde_json::from_value(data).wrap_err("parsing title_updated")?,
            ),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::ConversationCreated(_) => "conversation_created",
            StreamEvent::MessageSaved(_) => "message_saved",
            StreamEvent::MessageStart(_) => "message_start",
            StreamEvent::MessageChunk(_) => "message_chunk",
            StreamEvent::MessageComplete(_) => "message_complete",
            StreamEvent::MessageError(_) => "message_error",
            StreamEvent::TitleUpdated(_) => "title_updated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::MessageComplete(_) | StreamEvent::MessageError(_)
        )
    }
}
