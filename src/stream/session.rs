#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::decoder::{Frame, FrameDecoder};
use crate::backend::ArcBackend;
use crate::models::{
    ChatError, ConversationCreated, MessageChunk, MessageComplete, MessageError, MessageSaved,
    MessageStart, StreamEvent, StreamRequest, TitleUpdated, chat_error,
};

const CLOSED_BEFORE_COMPLETION: &str = "stream closed before completion";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Errored,
    Aborted,
    /// The connection closed in the middle of a frame.
    Truncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    /// `message_complete` was seen; only `title_updated` may still arrive.
    Settling,
    Terminal(SessionOutcome),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminal(_))
    }
}

/// Receives the typed events of one session, in arrival order.
pub trait StreamHandler: Send {
    fn on_conversation_created(&mut self, _data: ConversationCreated) {}
    fn on_message_saved(&mut self, _data: MessageSaved) {}
    fn on_message_start(&mut self, _data: MessageStart) {}
    fn on_message_chunk(&mut self, _data: MessageChunk) {}
    fn on_message_complete(&mut self, _data: MessageComplete) {}
    fn on_message_error(&mut self, _data: MessageError) {}
    fn on_title_updated(&mut self, _data: TitleUpdated) {}

    /// Called exactly once, when the session turns terminal.
    fn on_finished(&mut self, _outcome: SessionOutcome) {}
}

pub fn dispatch(handler: &mut dyn StreamHandler, event: StreamEvent) {
    match event {
        StreamEvent::ConversationCreated(data) => handler.on_conversation_created(data),
        StreamEvent::MessageSaved(data) => handler.on_message_saved(data),
        StreamEvent::MessageStart(data) => handler.on_message_start(data),
        StreamEvent::MessageChunk(data) => handler.on_message_chunk(data),
        StreamEvent::MessageComplete(data) => handler.on_message_complete(data),
        StreamEvent::MessageError(data) => handler.on_message_error(data),
        StreamEvent::TitleUpdated(data) => handler.on_title_updated(data),
    }
}

/// Transport-independent state machine of a single send.
///
/// Bytes go in through [`StreamSession::feed`], typed events come out through
/// the handler. Once terminal every input is ignored.
#[derive(Debug)]
pub struct StreamSession {
    state: SessionState,
    decoder: FrameDecoder,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            decoder: FrameDecoder::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn open(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Streaming;
        }
    }

    pub fn feed(&mut self, chunk: &[u8], handler: &mut dyn StreamHandler) {
        if !self.accepts_input() {
            return;
        }
        for frame in self.decoder.feed_bytes(chunk) {
            self.dispatch_frame(frame, handler);
        }
    }

    /// End of the byte stream.
    pub fn finish(&mut self, handler: &mut dyn StreamHandler) {
        if !self.accepts_input() {
            return;
        }
        for frame in self.decoder.flush() {
            self.dispatch_frame(frame, handler);
        }
        if self.state.is_terminal() {
            return;
        }

        let outcome = match (self.state, self.decoder.truncated()) {
            (SessionState::Settling, false) => SessionOutcome::Completed,
            (SessionState::Settling, true) => {
                log::warn!("stream truncated after message_complete");
                SessionOutcome::Truncated
            }
            (_, true) => {
                handler.on_message_error(MessageError::new(
                    ChatError::TruncatedStream.to_string(),
                ));
                SessionOutcome::Truncated
            }
            (_, false) => {
                handler.on_message_error(MessageError::new(CLOSED_BEFORE_COMPLETION));
                SessionOutcome::Errored
            }
        };
        self.terminate(outcome, handler);
    }

    /// Transport failure: the request was rejected or a read failed.
    pub fn fail(&mut self, err: &eyre::Report, handler: &mut dyn StreamHandler) {
        if self.state.is_terminal() {
            return;
        }
        self.decoder.reset();
        if self.state == SessionState::Settling {
            log::warn!("stream failed after message_complete: {}", err);
            self.terminate(SessionOutcome::Completed, handler);
            return;
        }

        let message = match chat_error(err) {
            Some(ChatError::Transport { message, .. }) => message.clone(),
            _ => err.to_string(),
        };
        log::error!("stream failed: {:?}", err);
        handler.on_message_error(MessageError::new(message));
        self.terminate(SessionOutcome::Errored, handler);
    }

    /// Returns false when the session was already terminal.
    pub fn abort(&mut self, handler: &mut dyn StreamHandler) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.decoder.reset();
        self.terminate(SessionOutcome::Aborted, handler);
        true
    }

    fn accepts_input(&self) -> bool {
        matches!(self.state, SessionState::Streaming | SessionState::Settling)
    }

    fn dispatch_frame(&mut self, frame: Frame, handler: &mut dyn StreamHandler) {
        if self.state.is_terminal() {
            log::debug!("dropping {} frame after terminal event", frame.kind);
            return;
        }

        let event = match StreamEvent::from_parts(&frame.kind, frame.data) {
            Ok(Some(event)) => event,
            Ok(None) => {
                log::debug!("ignoring unknown frame type: {}", frame.kind);
                return;
            }
            Err(err) => {
                let err = ChatError::Decode(format!("{:#}", err));
                log::warn!("{}", err);
                return;
            }
        };

        if self.state == SessionState::Settling && !matches!(event, StreamEvent::TitleUpdated(_))
        {
            log::warn!("dropping {} frame after message_complete", event.kind());
            return;
        }

        let next = match &event {
            StreamEvent::MessageComplete(_) => Some(SessionState::Settling),
            StreamEvent::MessageError(_) => {
                Some(SessionState::Terminal(SessionOutcome::Errored))
            }
            _ => None,
        };

        log::trace!("dispatching {} frame", event.kind());
        dispatch(handler, event);

        match next {
            Some(SessionState::Terminal(outcome)) => self.terminate(outcome, handler),
            Some(state) => self.state = state,
            None => {}
        }
    }

    fn terminate(&mut self, outcome: SessionOutcome, handler: &mut dyn StreamHandler) {
        log::debug!("session finished: {:?}", outcome);
        self.state = SessionState::Terminal(outcome);
        handler.on_finished(outcome);
    }
}

struct SessionCore {
    session: StreamSession,
    handler: Box<dyn StreamHandler>,
}

impl SessionCore {
    fn feed(&mut self, chunk: &[u8]) {
        let SessionCore { session, handler } = self;
        session.feed(chunk, handler.as_mut());
    }

    fn finish(&mut self) {
        let SessionCore { session, handler } = self;
        session.finish(handler.as_mut());
    }

    fn fail(&mut self, err: &eyre::Report) {
        let SessionCore { session, handler } = self;
        session.fail(err, handler.as_mut());
    }

    fn abort(&mut self) -> bool {
        let SessionCore { session, handler } = self;
        session.abort(handler.as_mut())
    }
}

/// Handle to a running session. Dropping it does not stop the session.
pub struct SessionHandle {
    id: u64,
    core: Arc<Mutex<SessionCore>>,
    cancel_token: CancellationToken,
    worker: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops local reading. A chunk that is being dispatched when this is
    /// called is delivered in full first; nothing is dispatched afterwards.
    pub async fn abort(&self) -> bool {
        let aborted = self.core.lock().await.abort();
        self.cancel_token.cancel();
        aborted
    }

    pub async fn state(&self) -> SessionState {
        self.core.lock().await.session.state()
    }

    pub async fn is_terminal(&self) -> bool {
        self.state().await.is_terminal()
    }

    /// Waits for the reader task and returns the final outcome.
    pub async fn wait(self) -> Option<SessionOutcome> {
        if let Err(err) = self.worker.await {
            log::error!("session {} worker failed: {}", self.id, err);
        }
        match self.core.lock().await.session.state() {
            SessionState::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Opens one stream for `request` and drives it to a terminal state on a
/// background task.
pub fn start<H>(backend: ArcBackend, request: StreamRequest, handler: H) -> SessionHandle
where
    H: StreamHandler + 'static,
{
    let id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
    let mut session = StreamSession::new();
    session.open();
    let core = Arc::new(Mutex::new(SessionCore {
        session,
        handler: Box::new(handler),
    }));
    let cancel_token = CancellationToken::new();

    let worker = tokio::spawn(run(
        id,
        Arc::clone(&core),
        backend,
        request,
        cancel_token.clone(),
    ));

    SessionHandle {
        id,
        core,
        cancel_token,
        worker,
    }
}

async fn run(
    id: u64,
    core: Arc<Mutex<SessionCore>>,
    backend: ArcBackend,
    request: StreamRequest,
    cancel_token: CancellationToken,
) {
    log::debug!("session {} opening stream", id);
    let opened = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => return,
        res = backend.open_stream(request) => res,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            core.lock().await.fail(&err);
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log::debug!("session {} cancelled", id);
                return;
            }
            next = stream.next() => next,
        };

        let mut guard = core.lock().await;
        match next {
            Some(Ok(chunk)) => guard.feed(&chunk),
            Some(Err(err)) => {
                guard.fail(&err);
                return;
            }
            None => {
                guard.finish();
                return;
            }
        }
        if guard.session.state().is_terminal() {
            return;
        }
    }
}
