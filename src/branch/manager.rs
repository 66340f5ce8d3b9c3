#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;

use std::collections::{HashMap, HashSet};

use eyre::{Context, Result};

use crate::backend::ArcBackend;
use crate::config::Configuration;
use crate::models::{Branch, BranchListing, ChatError, MAIN_BRANCH_ID, Message, message};
use crate::store::MessageStore;

/// Branch set of one conversation, kept as a flat arena keyed by id. Tree
/// structure lives in each branch's parent pointers.
#[derive(Debug, Clone, Default)]
struct Arena {
    branches: HashMap<String, Branch>,
    order: Vec<String>,
    main_id: String,
}

impl Arena {
    fn single_main() -> Self {
        Self::from_branches(vec![])
    }

    /// Builds an arena holding exactly one main branch. Listings from older
    /// servers omit `is_main`, so a branch named `main` is promoted, and a
    /// synthetic one is added when none qualifies.
    fn from_branches(branches: Vec<Branch>) -> Self {
        let mut arena = Arena::default();
        for branch in branches {
            if arena.branches.contains_key(branch.id()) {
                log::warn!("duplicate branch {} in listing", branch.id());
                continue;
            }
            arena.order.push(branch.id().to_string());
            arena.branches.insert(branch.id().to_string(), branch);
        }

        let main_id = arena
            .order
            .iter()
            .find(|id| arena.branches[id.as_str()].is_main())
            .or_else(|| {
                arena
                    .order
                    .iter()
                    .find(|id| arena.branches[id.as_str()].looks_like_main())
            })
            .cloned();

        let main_id = match main_id {
            Some(id) => id,
            None => {
                log::debug!("listing has no main branch, adding one");
                let main = Branch::main();
                arena.order.insert(0, main.id().to_string());
                arena.branches.insert(main.id().to_string(), main);
                MAIN_BRANCH_ID.to_string()
            }
        };

        for (id, branch) in arena.branches.iter_mut() {
            let is_main = *id == main_id;
            if branch.is_main() != is_main {
                *branch = branch.clone().with_main(is_main);
            }
        }
        arena.main_id = main_id;
        arena
    }

    fn contains(&self, id: &str) -> bool {
        self.branches.contains_key(id)
    }
}

pub struct BranchManager {
    backend: ArcBackend,
    conversation_id: Option<String>,
    arena: Arena,
    active_branch_id: String,
}

impl BranchManager {
    pub fn new(backend: ArcBackend) -> Self {
        Self {
            backend,
            conversation_id: None,
            arena: Arena::single_main(),
            active_branch_id: MAIN_BRANCH_ID.to_string(),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn active_branch_id(&self) -> &str {
        &self.active_branch_id
    }

    pub fn active_branch(&self) -> Option<&Branch> {
        self.arena.branches.get(&self.active_branch_id)
    }

    pub fn main_branch_id(&self) -> &str {
        &self.arena.main_id
    }

    pub fn get(&self, branch_id: &str) -> Option<&Branch> {
        self.arena.branches.get(branch_id)
    }

    /// Branches in listing order.
    pub fn branches(&self) -> Vec<Branch> {
        self.arena
            .order
            .iter()
            .filter_map(|id| self.arena.branches.get(id))
            .cloned()
            .collect()
    }

    pub fn children(&self, branch_id: &str) -> Vec<&Branch> {
        self.arena
            .order
            .iter()
            .filter_map(|id| self.arena.branches.get(id))
            .filter(|b| b.parent_branch_id() == Some(branch_id))
            .collect()
    }

    /// Path from `branch_id` up to the root, starting with the branch itself.
    pub fn ancestry(&self, branch_id: &str) -> Vec<&Branch> {
        let mut path = vec![];
        let mut seen = HashSet::new();
        let mut cursor = self.arena.branches.get(branch_id);
        while let Some(branch) = cursor {
            if !seen.insert(branch.id()) {
                log::warn!("branch parent cycle at {}", branch.id());
                break;
            }
            path.push(branch);
            cursor = branch
                .parent_branch_id()
                .and_then(|parent| self.arena.branches.get(parent));
        }
        path
    }

    /// Exactly one main branch, and the active branch is part of the set.
    pub fn is_consistent(&self) -> bool {
        let mains = self.arena.branches.values().filter(|b| b.is_main()).count();
        mains == 1
            && self.arena.contains(&self.arena.main_id)
            && self.arena.contains(&self.active_branch_id)
            && self.arena.order.len() == self.arena.branches.len()
    }

    /// Forgets the current conversation; used for a fresh chat.
    pub fn reset(&mut self) {
        self.conversation_id = None;
        self.arena = Arena::single_main();
        self.active_branch_id = self.arena.main_id.clone();
    }

    /// A conversation born from the current send starts with `main` only.
    pub fn adopt_new_conversation(&mut self, conversation_id: impl Into<String>) {
        self.conversation_id = Some(conversation_id.into());
        self.arena = Arena::single_main();
        self.active_branch_id = self.arena.main_id.clone();
    }

    /// Fetches the branch set of `conversation_id` and fills `store` with the
    /// active branch's messages.
    pub async fn load(&mut self, conversation_id: &str, store: &mut MessageStore) -> Result<()> {
        let listing = self
            .backend
            .list_branches(conversation_id.to_string())
            .await
            .wrap_err("loading branches")?;

        let arena = Arena::from_branches(listing.branches.clone());
        let active = match listing.resolved_active() {
            Some(id) if arena.contains(id) => id.to_string(),
            Some(id) => {
                log::warn!("active branch {} is not listed, using main", id);
                arena.main_id.clone()
            }
            None => arena.main_id.clone(),
        };
        let messages = self
            .messages_for(conversation_id, &active, listing.messages)
            .await?;

        self.commit(Some(conversation_id.to_string()), arena, active, store, Some(messages));
        Ok(())
    }

    /// Forks at `from_message_id` and makes the new branch active.
    pub async fn create(&mut self, store: &mut MessageStore, from_message_id: &str) -> Result<Branch> {
        let conversation_id = self.require_conversation()?;
        if message::is_temporary_id(from_message_id) {
            return Err(ChatError::validation(
                "cannot branch from a message that has not been saved yet",
            )
            .into());
        }

        let name = generate_branch_name();
        log::debug!("creating branch {} from {}", name, from_message_id);
        let listing = self
            .backend
            .create_branch(
                conversation_id.clone(),
                from_message_id.to_string(),
                name.clone(),
            )
            .await?;

        let new_id = listing
            .resolved_active()
            .map(String::from)
            .or_else(|| {
                listing
                    .branches
                    .iter()
                    .find(|b| b.name() == name)
                    .map(|b| b.id().to_string())
            })
            .ok_or_else(|| eyre::eyre!("server did not report the new branch"))?;

        let mut branches = listing.branches.clone();
        if !branches.iter().any(|b| b.id() == new_id) {
            // Some servers only return the id; keep the old set plus the new entry.
            branches = self.branches();
            branches.push(
                Branch::new(&new_id, &name).with_parent(&self.active_branch_id, from_message_id),
            );
        }
        let arena = Arena::from_branches(branches);
        let messages = self
            .messages_for(&conversation_id, &new_id, listing.messages)
            .await?;

        let branch = arena.branches[&new_id].clone();
        self.commit(Some(conversation_id), arena, new_id, store, Some(messages));
        Ok(branch)
    }

    /// Returns false when `branch_id` was already active.
    pub async fn switch(&mut self, store: &mut MessageStore, branch_id: &str) -> Result<bool> {
        if branch_id == self.active_branch_id {
            return Ok(false);
        }
        let conversation_id = self.require_conversation()?;
        self.require_known(branch_id)?;

        let listing = self
            .backend
            .switch_branch(conversation_id.clone(), branch_id.to_string())
            .await?;
        let arena = self.arena_from_listing(&listing, None);
        if !arena.contains(branch_id) {
            eyre::bail!("branch {} disappeared while switching", branch_id);
        }
        let messages = self
            .messages_for(&conversation_id, branch_id, listing.messages)
            .await?;

        self.commit(
            Some(conversation_id),
            arena,
            branch_id.to_string(),
            store,
            Some(messages),
        );
        Ok(true)
    }

    pub async fn rename(&mut self, branch_id: &str, name: &str) -> Result<()> {
        let conversation_id = self.require_conversation()?;
        if branch_id == self.arena.main_id {
            return Err(ChatError::validation("the main branch cannot be renamed").into());
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::validation("branch name cannot be empty").into());
        }
        self.require_known(branch_id)?;

        let listing = self
            .backend
            .rename_branch(
                conversation_id.clone(),
                branch_id.to_string(),
                name.to_string(),
            )
            .await?;

        let mut arena = self.arena_from_listing(&listing, None);
        if let Some(branch) = arena.branches.get_mut(branch_id) {
            branch.set_name(name);
        }
        let active = if arena.contains(&self.active_branch_id) {
            self.active_branch_id.clone()
        } else {
            // Nothing to fetch: keep the old set rather than lose the active branch.
            log::warn!("rename response dropped the active branch, keeping local set");
            arena = self.arena.clone();
            if let Some(branch) = arena.branches.get_mut(branch_id) {
                branch.set_name(name);
            }
            self.active_branch_id.clone()
        };

        self.arena = arena;
        self.active_branch_id = active;
        Ok(())
    }

    /// Deletes `branch_id`; when it was active, main takes over.
    pub async fn delete(&mut self, store: &mut MessageStore, branch_id: &str) -> Result<()> {
        let conversation_id = self.require_conversation()?;
        if branch_id == self.arena.main_id {
            return Err(ChatError::validation("the main branch cannot be deleted").into());
        }
        self.require_known(branch_id)?;

        let listing = self
            .backend
            .delete_branch(conversation_id.clone(), branch_id.to_string())
            .await?;
        let arena = self.arena_from_listing(&listing, Some(branch_id));

        let active = self.active_branch_id.clone();
        if arena.contains(&active) && active != branch_id {
            self.commit(Some(conversation_id), arena, active, store, None);
            return Ok(());
        }

        // Main's messages must be in hand before anything local changes.
        let main_id = arena.main_id.clone();
        let main_listed = listing.resolved_active() == Some(main_id.as_str());
        let messages = match listing.messages {
            Some(messages) if main_listed => messages,
            _ => self
                .backend
                .get_messages(conversation_id.clone(), main_id.clone())
                .await
                .wrap_err("fetching main branch messages")?,
        };
        self.commit(Some(conversation_id), arena, main_id, store, Some(messages));
        Ok(())
    }

    fn require_conversation(&self) -> Result<String> {
        self.conversation_id
            .clone()
            .ok_or_else(|| ChatError::validation("no conversation selected").into())
    }

    fn require_known(&self, branch_id: &str) -> Result<()> {
        if !self.arena.contains(branch_id) {
            return Err(ChatError::validation(format!("unknown branch: {}", branch_id)).into());
        }
        Ok(())
    }

    /// Uses the listing when the server sent one, else the local set minus
    /// `removed`.
    fn arena_from_listing(&self, listing: &BranchListing, removed: Option<&str>) -> Arena {
        let mut branches = if listing.branches.is_empty() {
            self.branches()
        } else {
            listing.branches.clone()
        };
        if let Some(removed) = removed {
            branches.retain(|b| b.id() != removed);
        }
        Arena::from_branches(branches)
    }

    async fn messages_for(
        &self,
        conversation_id: &str,
        branch_id: &str,
        provided: Option<Vec<Message>>,
    ) -> Result<Vec<Message>> {
        match provided {
            Some(messages) => Ok(messages),
            None => self
                .backend
                .get_messages(conversation_id.to_string(), branch_id.to_string())
                .await
                .wrap_err_with(|| format!("fetching messages of branch {}", branch_id)),
        }
    }

    fn commit(
        &mut self,
        conversation_id: Option<String>,
        arena: Arena,
        active_branch_id: String,
        store: &mut MessageStore,
        messages: Option<Vec<Message>>,
    ) {
        self.conversation_id = conversation_id;
        self.arena = arena;
        self.active_branch_id = active_branch_id;
        if let Some(messages) = messages {
            store.replace_all(messages);
        }
        debug_assert!(self.is_consistent());
    }
}

pub fn generate_branch_name() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    format!(
        "{}{}",
        Configuration::instance().stream.branch_name_prefix,
        to_base36(millis)
    )
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = vec![];
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).to_string()
}
