//! Directive system: the actor's action surface.
//!
//! A directive is invoked either by a participant (typed directly into chat)
//! or by the model (embedded in a generated response); both go through the
//! same registry. The registry only knows names and contracts; the catalog
//! of world actions is supplied by the environment integration at startup.

pub mod builtin;
pub mod parse;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agent::interrupt::InterruptGate;
use crate::agent::self_prompter::SelfPrompter;
use crate::history::HistoryStore;
use crate::world::WorldLink;

/// The one directive whose preceding free text is recorded as context before
/// execution (the request is the action's specification).
pub const NEW_ACTION: &str = "!newAction";

/// Privileged to user-triggered cycles: a self-prompt cycle may not stop
/// itself.
pub const STOP_SELF_PROMPT: &str = "!stopSelfPrompt";

/// Collaborators a directive may touch while executing.
#[derive(Clone)]
pub struct CommandContext {
    pub username: String,
    pub world: Arc<dyn WorldLink>,
    pub history: Arc<dyn HistoryStore>,
    pub self_prompter: Arc<SelfPrompter>,
    pub gate: Arc<InterruptGate>,
    pub registry: Arc<CommandRegistry>,
}

#[async_trait]
pub trait Command: Send + Sync {
    /// Directive name including the marker (e.g. `"!selfPrompt"`).
    fn name(&self) -> &str;

    /// One-line usage shown in the catalog listing.
    fn description(&self) -> &str;

    /// Whether this directive drives a world action, as opposed to a query
    /// or control directive. The self-prompt cadence pauses around
    /// user-prompted actions.
    fn is_action(&self) -> bool {
        false
    }

    /// Execute with the raw argument text (the content of the parentheses,
    /// possibly empty). The returned text feeds back into the conversation;
    /// `None` means there is nothing to report.
    async fn perform(&self, ctx: &CommandContext, args: &str) -> Result<Option<String>>;
}

/// Thread-safe directive catalog.
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
        }
    }

    /// Register a directive. Overwrites any existing one with the same name.
    pub async fn register(&self, command: Arc<dyn Command>) {
        let name = command.name().to_string();
        tracing::debug!("Registered directive: {}", name);
        self.commands.write().await.insert(name, command);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.read().await.get(name).cloned()
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.commands.read().await.contains_key(name)
    }

    pub async fn is_action(&self, name: &str) -> bool {
        self.get(name)
            .await
            .map(|command| command.is_action())
            .unwrap_or(false)
    }

    /// Catalog listing for the `!commands` directive.
    pub async fn describe_all(&self) -> String {
        let commands = self.commands.read().await;
        let mut lines: Vec<String> = commands
            .values()
            .map(|command| format!("{}: {}", command.name(), command.description()))
            .collect();
        lines.sort();
        format!("Available directives:\n{}", lines.join("\n"))
    }

    /// Execute the first directive in `text`. Callers are expected to have
    /// checked `exists`; an unregistered name here is an execution error,
    /// not a classification result.
    pub async fn execute(&self, ctx: &CommandContext, text: &str) -> Result<Option<String>> {
        let name = parse::contains_directive(text)
            .ok_or_else(|| anyhow::anyhow!("No directive found in: {}", text))?;
        let command = self
            .get(name)
            .await
            .ok_or_else(|| anyhow::anyhow!("Unknown directive: {}", name))?;
        let args = parse::directive_args(text).unwrap_or("");

        let output = command
            .perform(ctx, args)
            .await
            .with_context(|| format!("Directive {} failed", name))?;
        Ok(output.filter(|out| !out.trim().is_empty()))
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
