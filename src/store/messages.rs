#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;

use std::time::Duration;

use super::refresh::{RefreshGuard, RefreshTicket};
use crate::config::Configuration;
use crate::models::{ChatError, Message, MessageComplete, Role};

/// What [`MessageStore::settle`] did with a confirmed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// An entry with that stable id was already present.
    AlreadyPresent,
    /// The temporary entry at this index was replaced in place.
    ReplacedTemporary(usize),
    Appended(usize),
}

impl Settlement {
    pub fn changed(&self) -> bool {
        !matches!(self, Settlement::AlreadyPresent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    SkippedStale,
    SkippedStreaming,
}

#[derive(Debug, Clone, Default)]
struct StreamingBuffer {
    message_id: String,
    content: String,
}

/// Live message list of the active branch.
#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    streaming: Option<StreamingBuffer>,
    guard: RefreshGuard,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        let ttl = Configuration::instance().stream.refresh_guard();
        Self::with_refresh_ttl(ttl)
    }

    pub fn with_refresh_ttl(ttl: Duration) -> Self {
        Self {
            messages: vec![],
            streaming: None,
            guard: RefreshGuard::new(ttl),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn insert_optimistic(&mut self, message: Message) {
        if !message.is_temporary() {
            log::warn!("optimistic insert of stable id {}", message.id());
        }
        self.messages.push(message);
    }

    /// Merges a server-confirmed message:
    /// same id present is a no-op, else the first temporary entry with equal
    /// content is replaced where it stands, else the message is appended.
    pub fn settle(&mut self, message: Message) -> Settlement {
        if self.messages.iter().any(|m| m.id() == message.id()) {
            log::trace!("message {} already settled", message.id());
            return Settlement::AlreadyPresent;
        }

        let settlement = match self
            .messages
            .iter()
            .position(|m| m.is_temporary() && m.content() == message.content())
        {
            Some(idx) => {
                self.messages[idx] = message;
                Settlement::ReplacedTemporary(idx)
            }
            None => {
                self.messages.push(message);
                Settlement::Appended(self.messages.len() - 1)
            }
        };
        self.guard.arm();
        settlement
    }

    /// Drops a temporary entry, e.g. when its send failed before the server
    /// saw it.
    pub fn remove_temporary(&mut self, id: &str) -> Option<Message> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.is_temporary() && m.id() == id)?;
        Some(self.messages.remove(idx))
    }

    /// Looks up a saved message of `role`. Temporary entries are rejected:
    /// the server does not know them yet.
    pub fn require_saved(&self, id: &str, role: Role) -> Result<&Message, ChatError> {
        if crate::models::message::is_temporary_id(id) {
            return Err(ChatError::validation(
                "message is not saved yet, wait for it to be saved",
            ));
        }
        let message = self
            .get(id)
            .ok_or_else(|| ChatError::validation(format!("unknown message {}", id)))?;
        if message.role() != role {
            return Err(ChatError::validation(format!(
                "message {} has role {}, expected {}",
                id,
                message.role().as_str(),
                role.as_str()
            )));
        }
        Ok(message)
    }

    /// Applies a server-side edit of `message_id`: the edited message takes
    /// its place, everything after it is dropped and the regenerated reply,
    /// if any, is appended. Returns false when the message is gone.
    pub fn apply_edit(&mut self, message_id: &str, edited: Message, reply: Option<Message>) -> bool {
        let Some(idx) = self.messages.iter().position(|m| m.id() == message_id) else {
            log::debug!("edited message {} no longer listed", message_id);
            return false;
        };
        self.messages.truncate(idx + 1);
        self.messages[idx] = edited;
        if let Some(reply) = reply {
            self.messages.push(reply);
        }
        self.guard.arm();
        true
    }

    /// Replaces `message_id` where it stands, e.g. with a regenerated reply.
    pub fn replace_message(&mut self, message_id: &str, message: Message) -> bool {
        let Some(slot) = self.messages.iter_mut().find(|m| m.id() == message_id) else {
            log::debug!("replaced message {} no longer listed", message_id);
            return false;
        };
        *slot = message;
        self.guard.arm();
        true
    }

    pub fn begin_stream(&mut self, message_id: impl Into<String>) {
        let message_id = message_id.into();
        if let Some(previous) = &self.streaming {
            log::warn!(
                "discarding unfinished stream {} for {}",
                previous.message_id,
                message_id
            );
        }
        self.streaming = Some(StreamingBuffer {
            message_id,
            content: String::new(),
        });
    }

    /// Appends a delta to the in-flight message. Returns false when no
    /// stream is open or the delta belongs to another message.
    pub fn push_chunk(&mut self, message_id: Option<&str>, delta: &str) -> bool {
        let Some(buffer) = self.streaming.as_mut() else {
            log::debug!("chunk without message_start dropped");
            return false;
        };
        if message_id.is_some_and(|id| id != buffer.message_id) {
            log::debug!("chunk for foreign message {:?} dropped", message_id);
            return false;
        }
        buffer.content.push_str(delta);
        true
    }

    /// Commits the final assistant message through [`Self::settle`]. The
    /// server's full text wins over the accumulated deltas.
    pub fn complete_stream(&mut self, data: &MessageComplete) -> Settlement {
        if let Some(buffer) = self.streaming.take() {
            if buffer.message_id != data.message_id {
                log::warn!(
                    "completion for {} closes stream of {}",
                    data.message_id,
                    buffer.message_id
                );
            }
        }
        let message = Message::new_assistant(&data.message_id, &data.content)
            .with_metadata(data.metadata.clone());
        self.settle(message)
    }

    /// Forgets partial streamed text without committing it.
    pub fn discard_stream(&mut self) -> Option<String> {
        self.streaming.take().map(|buffer| buffer.content)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn streaming_message_id(&self) -> Option<&str> {
        self.streaming.as_ref().map(|b| b.message_id.as_str())
    }

    pub fn streaming_content(&self) -> Option<&str> {
        self.streaming.as_ref().map(|b| b.content.as_str())
    }

    /// Wholesale replacement after a branch change. Counts as an
    /// authoritative write, so refreshes requested earlier are stale.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.streaming = None;
        self.guard.arm();
    }

    pub fn clear(&mut self) {
        self.replace_all(vec![]);
    }

    /// Call when a refresh request is sent; hand the ticket back with the
    /// snapshot it produced.
    pub fn refresh_ticket(&self) -> RefreshTicket {
        self.guard.ticket()
    }

    pub fn apply_refresh(&mut self, ticket: RefreshTicket, snapshot: Vec<Message>) -> RefreshOutcome {
        if self.is_streaming() {
            log::debug!("refresh skipped while streaming");
            return RefreshOutcome::SkippedStreaming;
        }
        if self.guard.consume(ticket) {
            log::debug!(
                "stale refresh skipped (ticket {}, generation {})",
                ticket.generation(),
                self.guard.generation()
            );
            return RefreshOutcome::SkippedStale;
        }
        self.messages = snapshot;
        RefreshOutcome::Applied
    }
}
