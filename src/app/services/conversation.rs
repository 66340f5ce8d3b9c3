#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use std::sync::Arc;

use eyre::Result;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::PendingTasks;
use crate::backend::ArcBackend;
use crate::branch::BranchManager;
use crate::models::{
    Action, ArcEventTx, Attachment, ChatError, Conversation, ConversationCreated, Event, Message,
    MessageChunk, MessageComplete, MessageError, MessageSaved, MessageStart, Role, StreamEvent,
    StreamRequest, TitleUpdated,
};
use crate::store::{MessageStore, RefreshOutcome, RefreshTicket};
use crate::stream::{self, CancellationCoordinator, SessionHandle, SessionOutcome, StreamHandler};

#[derive(Debug)]
enum SessionSignal {
    Event(StreamEvent),
    Finished(SessionOutcome),
}

/// Forwards session callbacks into the service mailbox, tagged with the send
/// they belong to.
struct MailboxHandler {
    seq: u64,
    tx: mpsc::UnboundedSender<(u64, SessionSignal)>,
}

impl MailboxHandler {
    fn forward(&self, signal: SessionSignal) {
        if self.tx.send((self.seq, signal)).is_err() {
            log::debug!("service gone, dropping signal of send {}", self.seq);
        }
    }
}

impl StreamHandler for MailboxHandler {
    fn on_conversation_created(&mut self, data: ConversationCreated) {
        self.forward(SessionSignal::Event(StreamEvent::ConversationCreated(data)));
    }
    fn on_message_saved(&mut self, data: MessageSaved) {
        self.forward(SessionSignal::Event(StreamEvent::MessageSaved(data)));
    }
    fn on_message_start(&mut self, data: MessageStart) {
        self.forward(SessionSignal::Event(StreamEvent::MessageStart(data)));
    }
    fn on_message_chunk(&mut self, data: MessageChunk) {
        self.forward(SessionSignal::Event(StreamEvent::MessageChunk(data)));
    }
    fn on_message_complete(&mut self, data: MessageComplete) {
        self.forward(SessionSignal::Event(StreamEvent::MessageComplete(data)));
    }
    fn on_message_error(&mut self, data: MessageError) {
        self.forward(SessionSignal::Event(StreamEvent::MessageError(data)));
    }
    fn on_title_updated(&mut self, data: TitleUpdated) {
        self.forward(SessionSignal::Event(StreamEvent::TitleUpdated(data)));
    }
    fn on_finished(&mut self, outcome: SessionOutcome) {
        self.forward(SessionSignal::Finished(outcome));
    }
}

struct ActiveSend {
    seq: u64,
    handle: SessionHandle,
    /// Assistant message being streamed, known after `message_start`.
    message_id: Option<String>,
    /// Optimistic user message of this send.
    temporary_id: String,
}

struct Refreshed {
    ticket: RefreshTicket,
    conversation_id: String,
    branch_id: String,
    result: Result<Vec<Message>>,
}

/// Single writer for one conversation view. Every mutation of the message
/// store and the branch set happens on this task, in mailbox order.
pub struct ConversationService {
    backend: ArcBackend,
    event_tx: ArcEventTx,
    action_rx: mpsc::UnboundedReceiver<Action>,
    cancel_token: CancellationToken,
    pending_tasks: Arc<PendingTasks>,
    coordinator: CancellationCoordinator,

    store: MessageStore,
    branches: BranchManager,
    conversation: Option<Conversation>,
    config_id: Option<String>,

    session_tx: mpsc::UnboundedSender<(u64, SessionSignal)>,
    session_rx: mpsc::UnboundedReceiver<(u64, SessionSignal)>,
    refresh_tx: mpsc::UnboundedSender<Refreshed>,
    refresh_rx: mpsc::UnboundedReceiver<Refreshed>,
    active: Option<ActiveSend>,
    next_seq: u64,
}

impl ConversationService {
    pub fn new(
        backend: ArcBackend,
        action_rx: mpsc::UnboundedReceiver<Action>,
        event_tx: ArcEventTx,
        cancel_token: CancellationToken,
        pending_tasks: Arc<PendingTasks>,
    ) -> Self {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        Self {
            coordinator: CancellationCoordinator::new(Arc::clone(&backend)),
            branches: BranchManager::new(Arc::clone(&backend)),
            backend,
            event_tx,
            action_rx,
            cancel_token,
            pending_tasks,
            store: MessageStore::new(),
            conversation: None,
            config_id: None,
            session_tx,
            session_rx,
            refresh_tx,
            refresh_rx,
            active: None,
            next_seq: 0,
        }
    }

    pub fn with_config_id(mut self, config_id: Option<String>) -> Self {
        self.config_id = config_id;
        self
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    // A running response is stopped and its server cancel
                    // tracked before this returns.
                    log::debug!("Conversation service cancelled");
                    if let Some(active) = self.active.take() {
                        self.stop_session(&active).await;
                    }
                    return Ok(());
                }

                signal = self.session_rx.recv() => {
                    if let Some((seq, signal)) = signal {
                        self.handle_signal(seq, signal).await;
                    }
                }

                refreshed = self.refresh_rx.recv() => {
                    if let Some(refreshed) = refreshed {
                        self.handle_refreshed(refreshed).await;
                    }
                }

                action = self.action_rx.recv() => {
                    let Some(action) = action else {
                        log::debug!("Action channel closed");
                        return Ok(());
                    };
                    if let Err(err) = self.handle_action(action).await {
                        log::error!("Action failed: {:#}", err);
                        self.emit(Event::Error(error_text(&err))).await;
                    }
                }
            }
        }
    }

    async fn handle_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Send {
                content,
                attachments,
            } => self.send(content, attachments).await,

            Action::Stop => {
                if let Some(active) = &self.active {
                    self.stop_session(active).await;
                }
                Ok(())
            }

            Action::SelectConfig(config_id) => {
                self.config_id = Some(config_id);
                Ok(())
            }

            Action::EditMessage(message_id, content) => self.edit(message_id, content).await,

            Action::RegenerateMessage(message_id) => self.regenerate(message_id).await,

            Action::OpenConversation(conversation_id) => {
                self.ensure_idle("open another conversation")?;
                self.open(conversation_id).await
            }

            Action::Refresh => {
                self.refresh();
                Ok(())
            }

            Action::CreateBranch(message_id) => {
                self.ensure_idle("branch")?;
                self.branches.create(&mut self.store, &message_id).await?;
                self.branches_changed().await;
                Ok(())
            }

            Action::SwitchBranch(branch_id) => {
                self.ensure_idle("switch branches")?;
                if self.branches.switch(&mut self.store, &branch_id).await? {
                    self.branches_changed().await;
                }
                Ok(())
            }

            Action::RenameBranch(branch_id, name) => {
                self.branches.rename(&branch_id, &name).await?;
                self.emit_branches().await;
                Ok(())
            }

            Action::DeleteBranch(branch_id) => {
                self.ensure_idle("delete branches")?;
                self.branches.delete(&mut self.store, &branch_id).await?;
                self.branches_changed().await;
                Ok(())
            }
        }
    }

    async fn send(&mut self, content: String, attachments: Vec<Attachment>) -> Result<()> {
        self.ensure_idle("send")?;
        let config_id = self
            .config_id
            .clone()
            .ok_or_else(|| ChatError::validation("no model configuration selected"))?;
        if content.trim().is_empty() {
            return Err(ChatError::validation("message cannot be empty").into());
        }
        for attachment in &attachments {
            attachment.validate()?;
        }

        let optimistic = Message::new_optimistic(&content, attachments.clone());
        let temporary_id = optimistic.id().to_string();
        self.store.insert_optimistic(optimistic);
        self.emit_messages().await;

        let request = StreamRequest::new(config_id, content)
            .with_conversation_id(self.conversation.as_ref().map(|c| c.id().to_string()))
            .with_attachments(attachments);

        self.next_seq += 1;
        let handler = MailboxHandler {
            seq: self.next_seq,
            tx: self.session_tx.clone(),
        };
        let handle = stream::start(Arc::clone(&self.backend), request, handler);
        log::debug!("send {} started session {}", self.next_seq, handle.id());
        self.active = Some(ActiveSend {
            seq: self.next_seq,
            handle,
            message_id: None,
            temporary_id,
        });
        Ok(())
    }

    /// Edits a saved user message and regenerates the reply to it.
    async fn edit(&mut self, message_id: String, content: String) -> Result<()> {
        self.ensure_idle("edit messages")?;
        self.require_conversation()?;
        if content.trim().is_empty() {
            return Err(ChatError::validation("message cannot be empty").into());
        }
        self.store.require_saved(&message_id, Role::User)?;

        let edited = self
            .backend
            .edit_message(message_id.clone(), content, true)
            .await?;
        log::debug!(
            "edited {}, server dropped {} later messages",
            message_id,
            edited.deleted_count
        );
        if self
            .store
            .apply_edit(&message_id, edited.message, edited.assistant_message)
        {
            self.emit_messages().await;
        }
        Ok(())
    }

    async fn regenerate(&mut self, message_id: String) -> Result<()> {
        self.ensure_idle("regenerate")?;
        let conversation_id = self.require_conversation()?;
        self.store.require_saved(&message_id, Role::Assistant)?;

        let regenerated = self.backend.regenerate_message(message_id.clone()).await?;
        match regenerated.branch_id.as_deref() {
            // The server forked the answer onto another branch; reload it.
            Some(branch_id) if branch_id != self.branches.active_branch_id() => {
                log::debug!("regenerated {} onto branch {}", message_id, branch_id);
                self.branches.load(&conversation_id, &mut self.store).await?;
                self.branches_changed().await;
            }
            _ => {
                if self.store.replace_message(&message_id, regenerated.message) {
                    self.emit_messages().await;
                }
            }
        }
        Ok(())
    }

    async fn open(&mut self, conversation_id: Option<String>) -> Result<()> {
        match conversation_id {
            None => {
                self.branches.reset();
                self.store.clear();
                self.conversation = None;
            }
            Some(id) => {
                self.branches.load(&id, &mut self.store).await?;
                self.conversation =
                    Some(Conversation::new(&id).with_active_branch_id(self.branches.active_branch_id()));
            }
        }
        self.emit(Event::ConversationChanged(self.conversation.clone()))
            .await;
        self.branches_changed().await;
        Ok(())
    }

    fn refresh(&mut self) {
        let Some(conversation_id) = self.branches.conversation_id().map(String::from) else {
            return;
        };
        let branch_id = self.branches.active_branch_id().to_string();
        let ticket = self.store.refresh_ticket();
        let backend = Arc::clone(&self.backend);
        let refresh_tx = self.refresh_tx.clone();

        self.track(tokio::spawn(async move {
            let result = backend
                .get_messages(conversation_id.clone(), branch_id.clone())
                .await;
            let _ = refresh_tx.send(Refreshed {
                ticket,
                conversation_id,
                branch_id,
                result,
            });
        }));
    }

    async fn handle_refreshed(&mut self, refreshed: Refreshed) {
        if self.branches.conversation_id() != Some(refreshed.conversation_id.as_str())
            || self.branches.active_branch_id() != refreshed.branch_id
        {
            log::debug!("dropping refresh of {}", refreshed.branch_id);
            return;
        }
        match refreshed.result {
            Ok(messages) => {
                if self.store.apply_refresh(refreshed.ticket, messages) == RefreshOutcome::Applied {
                    self.emit_messages().await;
                }
            }
            Err(err) => {
                log::error!("Failed to refresh messages: {:#}", err);
                self.emit(Event::Error(error_text(&err))).await;
            }
        }
    }

    async fn handle_signal(&mut self, seq: u64, signal: SessionSignal) {
        if self.active.as_ref().map(|a| a.seq) != Some(seq) {
            log::debug!("ignoring signal of stale send {}: {:?}", seq, signal);
            return;
        }

        match signal {
            SessionSignal::Event(event) => self.apply_stream_event(event).await,
            SessionSignal::Finished(outcome) => {
                let Some(active) = self.active.take() else {
                    return;
                };
                if let Some(partial) = self.store.discard_stream() {
                    log::debug!("discarded {} bytes of partial content", partial.len());
                }
                // An unsettled user message never reached the server; a retry
                // inserts a fresh one.
                if outcome != SessionOutcome::Completed
                    && self.store.remove_temporary(&active.temporary_id).is_some()
                {
                    log::debug!("dropped unsettled message {}", active.temporary_id);
                    self.emit_messages().await;
                }
                self.emit(Event::SessionFinished(outcome)).await;
            }
        }
    }

    async fn apply_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ConversationCreated(data) => {
                let conversation = data.conversation;
                self.branches.adopt_new_conversation(conversation.id());
                let conversation =
                    conversation.with_active_branch_id(self.branches.active_branch_id());
                self.conversation = Some(conversation);
                self.emit(Event::ConversationChanged(self.conversation.clone()))
                    .await;
                self.emit_branches().await;
            }

            StreamEvent::MessageSaved(data) => {
                if self.store.settle(data.message).changed() {
                    self.emit_messages().await;
                }
            }

            StreamEvent::MessageStart(data) => {
                self.store.begin_stream(&data.message_id);
                if let Some(active) = self.active.as_mut() {
                    active.message_id = Some(data.message_id.clone());
                }
                self.emit(Event::StreamingStarted(data.message_id)).await;
            }

            StreamEvent::MessageChunk(data) => {
                if self.store.push_chunk(data.message_id.as_deref(), &data.content) {
                    let content = self.store.streaming_content().unwrap_or_default().to_string();
                    self.emit(Event::StreamingContent(content)).await;
                }
            }

            StreamEvent::MessageComplete(data) => {
                self.store.complete_stream(&data);
                self.emit_messages().await;
            }

            StreamEvent::MessageError(data) => {
                self.store.discard_stream();
                self.emit(Event::Error(data.error)).await;
            }

            StreamEvent::TitleUpdated(data) => {
                let Some(conversation) = self.conversation.as_mut() else {
                    return;
                };
                if conversation.id() != data.conversation_id {
                    log::debug!("title update for other conversation {}", data.conversation_id);
                    return;
                }
                conversation.set_title(&data.title);
                self.emit(Event::TitleUpdated {
                    conversation_id: data.conversation_id,
                    title: data.title,
                })
                .await;
            }
        }
    }

    async fn stop_session(&self, active: &ActiveSend) {
        if let Some(task) = self
            .coordinator
            .stop(&active.handle, active.message_id.clone())
            .await
        {
            self.track(task);
        }
    }

    fn require_conversation(&self) -> Result<String> {
        self.branches
            .conversation_id()
            .map(String::from)
            .ok_or_else(|| ChatError::validation("no conversation selected").into())
    }

    fn ensure_idle(&self, what: &str) -> Result<()> {
        if self.active.is_some() {
            return Err(ChatError::validation(format!(
                "cannot {} while a response is streaming",
                what
            ))
            .into());
        }
        Ok(())
    }

    /// Counts `task` as pending until it finishes, so shutdown can wait for it.
    fn track(&self, task: JoinHandle<()>) {
        self.pending_tasks.track(task);
    }

    async fn branches_changed(&mut self) {
        if let Some(conversation) = self.conversation.as_mut() {
            conversation.set_active_branch_id(self.branches.active_branch_id());
        }
        self.emit_branches().await;
        self.emit_messages().await;
    }

    async fn emit_branches(&self) {
        self.emit(Event::BranchesChanged {
            branches: self.branches.branches(),
            active_branch_id: self.branches.active_branch_id().to_string(),
        })
        .await;
    }

    async fn emit_messages(&self) {
        self.emit(Event::MessagesChanged(self.store.messages().to_vec()))
            .await;
    }

    async fn emit(&self, event: Event) {
        self.event_tx.send(event).await.unwrap_or_else(|err| {
            log::error!("Failed to send event: {}", err);
        });
    }
}

fn error_text(err: &eyre::Report) -> String {
    match crate::models::chat_error(err) {
        Some(ChatError::Validation(message)) => message.clone(),
        Some(err) => err.to_string(),
        None => format!("{:#}", err),
    }
}
