use super::Attachment;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send {
        content: String,
        attachments: Vec<Attachment>,
    },
    Stop,
    SelectConfig(String),

    EditMessage(String, String), // Message ID, new content
    RegenerateMessage(String),   // Message ID

    OpenConversation(Option<String>), // Conversation ID, None starts a new chat
    Refresh,

    CreateBranch(String),         // From message ID
    SwitchBranch(String),         // Branch ID
    RenameBranch(String, String), // Branch ID, new name
    DeleteBranch(String),         // Branch ID
}
