use std::sync::Arc;

use tokio::sync::mpsc;

use super::{Branch, Conversation, Message};
use crate::stream::SessionOutcome;

/// Notifications published by the conversation service to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConversationChanged(Option<Conversation>),
    TitleUpdated { conversation_id: String, title: String },

    MessagesChanged(Vec<Message>),
    StreamingStarted(String),
    StreamingContent(String),
    SessionFinished(SessionOutcome),

    BranchesChanged {
        branches: Vec<Branch>,
        active_branch_id: String,
    },

    Error(String),
}

#[async_trait::async_trait]
pub trait EventTx {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>>;
}

#[async_trait::async_trait]
impl EventTx for mpsc::Sender<Event> {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(event).await
    }
}

#[async_trait::async_trait]
impl EventTx for mpsc::UnboundedSender<Event> {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(event)
    }
}

pub type ArcEventTx = Arc<dyn EventTx + Send + Sync>;
