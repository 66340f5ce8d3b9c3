#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ChatError;
use crate::config::Configuration;
use crate::config::constants::{ATTACHMENT_MIME_TYPES, MAX_ATTACHMENT_BYTES};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn mime(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Rejects files the models cannot read: anything over 20 MiB or not a
    /// JPEG, PNG, GIF, WebP image or PDF.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.size > MAX_ATTACHMENT_BYTES {
            return Err(ChatError::validation(format!(
                "{} is too large, the maximum size is {} MB",
                self.name,
                MAX_ATTACHMENT_BYTES / (1024 * 1024)
            )));
        }
        if !ATTACHMENT_MIME_TYPES.contains(&self.mime()) {
            return Err(ChatError::validation(format!(
                "{} has unsupported type {:?}, use JPEG, PNG, GIF, WebP images or PDF",
                self.name,
                self.mime()
            )));
        }
        Ok(())
    }
}

/// Guesses an attachment MIME type from the file extension.
pub fn mime_type_for_path(path: &str) -> Option<&'static str> {
    let (_, ext) = path.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "_id")]
    id: String,
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
    #[serde(default = "chrono::Utc::now")]
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            attachments: vec![],
            created_at: chrono::Utc::now(),
            metadata: None,
        }
    }

    /// Builds a user message carrying a client-minted temporary id. The id is
    /// never sent to the server and is replaced on settlement.
    pub fn new_optimistic(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self::new(temporary_id(), Role::User, content).with_attachments(attachments)
    }

    pub fn new_user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    pub fn new_assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_created_at(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.created_at = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.id)
    }
}

pub fn temporary_id() -> String {
    format!(
        "{}{}",
        Configuration::instance().stream.temp_id_prefix,
        uuid::Uuid::new_v4()
    )
}

pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(Configuration::instance().stream.temp_id_prefix.as_str())
}

/// Response of `PUT /chat/messages/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditedMessage {
    pub message: Message,
    /// Reply generated for the edited message, when regeneration was asked.
    #[serde(default)]
    pub assistant_message: Option<Message>,
    #[serde(default)]
    pub deleted_count: u64,
}

/// Response of `POST /chat/regenerate/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegeneratedMessage {
    pub message: Message,
    #[serde(default)]
    pub branch_id: Option<String>,
}
