use serde::{Deserialize, Serialize};

use super::branch::MAIN_BRANCH_ID;

/// Client-side projection of a backend conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default = "main_branch_id", alias = "active_branch")]
    active_branch_id: String,
}

fn main_branch_id() -> String {
    MAIN_BRANCH_ID.to_string()
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_active_branch_id(mut self, branch_id: impl Into<String>) -> Self {
        self.active_branch_id = branch_id.into();
        self
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_active_branch_id(&mut self, branch_id: impl Into<String>) {
        self.active_branch_id = branch_id.into();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn active_branch_id(&self) -> &str {
        &self.active_branch_id
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: "New Chat".to_string(),
            active_branch_id: main_branch_id(),
        }
    }
}
