pub mod conversation;
pub mod shutdown;

pub use conversation::ConversationService;
pub use shutdown::{PendingTasks, ShutdownCoordinator};
