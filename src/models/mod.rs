pub mod action;
pub mod branch;
pub mod conversation;
pub mod error;
pub mod event;
pub mod message;
pub mod stream;

pub use action::Action;
pub use branch::{Branch, BranchListing, MAIN_BRANCH_ID};
pub use conversation::Conversation;
pub use error::{ChatError, chat_error};
pub use event::{ArcEventTx, Event, EventTx};
pub use message::{
    Attachment, EditedMessage, Message, RegeneratedMessage, Role, mime_type_for_path,
};
pub use stream::*;
