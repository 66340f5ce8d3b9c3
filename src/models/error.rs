use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The stream request could not be opened or returned a non-success status.
    #[error("transport error ({status}): {message}")]
    Transport { status: u16, message: String },

    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("stream closed in the middle of a frame")]
    TruncatedStream,

    #[error("{0}")]
    Validation(String),

    #[error("server cancel failed: {0}")]
    CancelAck(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::Validation(_))
    }
}

/// Returns the typed error carried by `err`, if any.
pub fn chat_error(err: &eyre::Report) -> Option<&ChatError> {
    err.downcast_ref::<ChatError>()
}
