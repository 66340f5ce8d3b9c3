use serde::{Deserialize, Serialize};

use super::Message;

pub const MAIN_BRANCH_ID: &str = "main";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    /// Message of the ancestor branch this branch forked from.
    #[serde(default, alias = "branch_point_message_id")]
    parent_message_id: Option<String>,
    #[serde(default, alias = "parent_branch")]
    parent_branch_id: Option<String>,
    #[serde(default)]
    is_main: bool,
}

impl Branch {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_message_id: None,
            parent_branch_id: None,
            is_main: false,
        }
    }

    pub fn main() -> Self {
        Self::new(MAIN_BRANCH_ID, MAIN_BRANCH_ID).with_main(true)
    }

    pub fn with_parent(
        mut self,
        branch_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        self.parent_branch_id = Some(branch_id.into());
        self.parent_message_id = Some(message_id.into());
        self
    }

    pub fn with_main(mut self, is_main: bool) -> Self {
        self.is_main = is_main;
        if is_main {
            self.parent_branch_id = None;
            self.parent_message_id = None;
        }
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_message_id(&self) -> Option<&str> {
        self.parent_message_id.as_deref()
    }

    pub fn parent_branch_id(&self) -> Option<&str> {
        self.parent_branch_id.as_deref()
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    /// Older payloads never set `is_main`; they name the root branch `main`.
    pub fn looks_like_main(&self) -> bool {
        self.is_main || self.id == MAIN_BRANCH_ID || self.name == MAIN_BRANCH_ID
    }
}

/// Body returned by every branch endpoint. Only `branches` is always present.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BranchListing {
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub active_branch: Option<String>,
    #[serde(default)]
    pub active_branch_id: Option<String>,
    /// Set by the create endpoint to the id of the new branch.
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
}

impl BranchListing {
    pub fn new(branches: Vec<Branch>) -> Self {
        Self {
            branches,
            ..Default::default()
        }
    }

    pub fn with_active(mut self, branch_id: impl Into<String>) -> Self {
        self.active_branch_id = Some(branch_id.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn resolved_active(&self) -> Option<&str> {
        self.active_branch_id
            .as_deref()
            .or(self.branch_id.as_deref())
            .or(self.active_branch.as_deref())
    }
}
