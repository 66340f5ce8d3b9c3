#[cfg(test)]
#[path = "cancel_test.rs"]
mod tests;

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::session::SessionHandle;
use crate::backend::ArcBackend;
use crate::models::ChatError;

/// Pairs the local abort of a session with the server-side cancel call.
#[derive(Clone)]
pub struct CancellationCoordinator {
    backend: ArcBackend,
}

impl CancellationCoordinator {
    pub fn new(backend: ArcBackend) -> Self {
        Self { backend }
    }

    /// Aborts `handle` and, when this call is the one that stopped it, fires
    /// the server cancel for `message_id` in the background. Returns the
    /// background task, or `None` when nothing was sent.
    pub async fn stop(
        &self,
        handle: &SessionHandle,
        message_id: Option<String>,
    ) -> Option<JoinHandle<()>> {
        if !handle.abort().await {
            log::debug!("session {} already finished, nothing to stop", handle.id());
            return None;
        }

        let message_id = message_id?;
        let backend = Arc::clone(&self.backend);
        Some(tokio::spawn(async move {
            if let Err(err) = backend.cancel(message_id.clone()).await {
                let err = ChatError::CancelAck(format!("{:#}", err));
                log::warn!("{} (message {})", err, message_id);
            }
        }))
    }
}
