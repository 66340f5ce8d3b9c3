pub mod messages;
pub mod refresh;

pub use messages::{MessageStore, RefreshOutcome, Settlement};
pub use refresh::{RefreshGuard, RefreshTicket};
