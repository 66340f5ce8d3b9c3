#[cfg(test)]
#[path = "repl_test.rs"]
mod tests;

use std::io::Write;

use eyre::Result;

use crate::models::{Action, Event, Role};
use crate::stream::SessionOutcome;

pub const HELP: &str = r#"Commands:
    /new                     start a new conversation
    /open <id>               open a conversation
    /config <id>             select the model configuration
    /attach <path> [name]    attach an image or PDF to the next message
    /stop                    stop the response being streamed
    /refresh                 reload the active branch
    /edit <message-id> <t>   edit a message and regenerate the reply
    /regenerate <message-id> regenerate a reply
    /branches                list branches
    /branch <message-id>     fork from a saved message
    /switch <branch-id>      switch branch
    /rename <branch-id> <n>  rename a branch
    /delete <branch-id>      delete a branch
    /help                    show this help
    /quit                    exit
Anything else is sent as a message."#;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Action(Action),
    Attach { path: String, name: Option<String> },
    ShowBranches,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Action(Action::Send {
            content: line.to_string(),
            attachments: vec![],
        });
    };

    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());

    match (name, arg) {
        ("new", None) => Input::Action(Action::OpenConversation(None)),
        ("open", Some(id)) => Input::Action(Action::OpenConversation(Some(id.to_string()))),
        ("config", Some(id)) => Input::Action(Action::SelectConfig(id.to_string())),
        ("attach", Some(arg)) => {
            let mut parts = arg.split_whitespace();
            let path = parts.next().unwrap_or_default().to_string();
            let name = parts.next().map(String::from);
            Input::Attach { path, name }
        }
        ("edit", Some(arg)) => match arg.split_once(char::is_whitespace) {
            Some((id, content)) => Input::Action(Action::EditMessage(
                id.to_string(),
                content.trim().to_string(),
            )),
            None => Input::Invalid("usage: /edit <message-id> <text>".to_string()),
        },
        ("regenerate", Some(id)) => Input::Action(Action::RegenerateMessage(id.to_string())),
        ("stop", None) => Input::Action(Action::Stop),
        ("refresh", None) => Input::Action(Action::Refresh),
        ("branches", None) => Input::ShowBranches,
        ("branch", Some(id)) => Input::Action(Action::CreateBranch(id.to_string())),
        ("switch", Some(id)) => Input::Action(Action::SwitchBranch(id.to_string())),
        ("delete", Some(id)) => Input::Action(Action::DeleteBranch(id.to_string())),
        ("rename", Some(arg)) => match arg.split_once(char::is_whitespace) {
            Some((id, name)) => Input::Action(Action::RenameBranch(
                id.to_string(),
                name.trim().to_string(),
            )),
            None => Input::Invalid("usage: /rename <branch-id> <name>".to_string()),
        },
        ("help", _) => Input::Help,
        ("quit" | "exit", _) => Input::Quit,
        (name, _) => Input::Invalid(format!("unknown or incomplete command: /{}", name)),
    }
}

/// Prints service events as a plain transcript.
#[derive(Debug, Default)]
pub struct Renderer {
    printed: usize,
    streaming: bool,
    show_transcript: bool,
    branches: Vec<(String, String, bool)>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, out: &mut impl Write, event: &Event) -> Result<()> {
        match event {
            Event::ConversationChanged(Some(conversation)) => {
                writeln!(out, "# conversation {}", conversation.id())?;
            }
            Event::ConversationChanged(None) => writeln!(out, "# new conversation")?,
            Event::TitleUpdated { title, .. } => writeln!(out, "# title: {}", title)?,

            Event::StreamingStarted(_) => {
                self.streaming = true;
                self.printed = 0;
                write!(out, "assistant> ")?;
            }
            Event::StreamingContent(content) => {
                if let Some(delta) = content.get(self.printed..) {
                    write!(out, "{}", delta)?;
                }
                self.printed = content.len();
            }
            Event::SessionFinished(outcome) => {
                if self.streaming {
                    writeln!(out)?;
                }
                self.streaming = false;
                self.printed = 0;
                if *outcome != SessionOutcome::Completed {
                    writeln!(out, "# response {:?}", outcome)?;
                }
            }

            Event::BranchesChanged {
                branches,
                active_branch_id,
            } => {
                self.branches = branches
                    .iter()
                    .map(|b| {
                        (
                            b.id().to_string(),
                            b.name().to_string(),
                            b.id() == active_branch_id,
                        )
                    })
                    .collect();
                self.show_transcript = true;
            }
            Event::MessagesChanged(messages) => {
                if !self.show_transcript {
                    return Ok(());
                }
                self.show_transcript = false;
                for message in messages {
                    let who = match message.role() {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    writeln!(out, "[{}] {}> {}", message.id(), who, message.content())?;
                }
            }

            Event::Error(message) => writeln!(out, "! {}", message)?,
        }
        out.flush()?;
        Ok(())
    }

    pub fn render_branches(&self, out: &mut impl Write) -> Result<()> {
        for (id, name, active) in &self.branches {
            let marker = if *active { "*" } else { " " };
            writeln!(out, "{} {} ({})", marker, name, id)?;
        }
        Ok(())
    }
}
