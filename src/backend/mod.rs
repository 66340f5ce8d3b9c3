pub mod http;

pub use http::HttpBackend;

#[cfg(test)]
use mockall::{automock, predicate::*};

use crate::{
    config::ServerConfig,
    models::{BranchListing, EditedMessage, Message, RegeneratedMessage, StreamRequest},
};
use async_trait::async_trait;
use bytes::Bytes;
use eyre::Result;
use futures::Stream;
use std::{pin::Pin, sync::Arc};

/// Raw response body of a chat stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Server endpoints the conversation engine talks to.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait Backend {
    /// Opens `POST /chat/stream`. Non-success statuses are returned as
    /// `ChatError::Transport`.
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream>;
    async fn cancel(&self, message_id: String) -> Result<()>;

    async fn get_messages(&self, conversation_id: String, branch_id: String)
    -> Result<Vec<Message>>;

    /// `PUT /chat/messages/{id}`. With `regenerate` the server drops every
    /// later message and answers the edited one again.
    async fn edit_message(
        &self,
        message_id: String,
        content: String,
        regenerate: bool,
    ) -> Result<EditedMessage>;
    async fn regenerate_message(&self, message_id: String) -> Result<RegeneratedMessage>;

    async fn list_branches(&self, conversation_id: String) -> Result<BranchListing>;
    async fn create_branch(
        &self,
        conversation_id: String,
        from_message_id: String,
        name: String,
    ) -> Result<BranchListing>;
    async fn switch_branch(
        &self,
        conversation_id: String,
        branch_id: String,
    ) -> Result<BranchListing>;
    async fn rename_branch(
        &self,
        conversation_id: String,
        branch_id: String,
        name: String,
    ) -> Result<BranchListing>;
    async fn delete_branch(
        &self,
        conversation_id: String,
        branch_id: String,
    ) -> Result<BranchListing>;
}

pub type ArcBackend = Arc<dyn Backend + Send + Sync>;

pub fn new_backend(config: &ServerConfig) -> Result<ArcBackend> {
    if config.endpoint.trim().is_empty() {
        eyre::bail!("No server endpoint configured");
    }
    let backend: HttpBackend = config.into();
    log::debug!("Using chat server at {}", backend.endpoint());
    Ok(Arc::new(backend))
}
