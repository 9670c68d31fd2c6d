//! Built-in directives: the control surface every actor carries regardless
//! of which environment it is embedded in. World actions (movement, looking,
//! crafting, ...) are registered by the environment integration.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{Command, CommandContext, CommandRegistry, STOP_SELF_PROMPT};

pub async fn register_builtins(registry: &CommandRegistry) {
    registry.register(Arc::new(ListCommands)).await;
    registry.register(Arc::new(StartSelfPrompt)).await;
    registry.register(Arc::new(StopSelfPrompt)).await;
    registry.register(Arc::new(ShutUp)).await;
}

fn unquote(args: &str) -> &str {
    let trimmed = args.trim();
    if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

pub struct ListCommands;

#[async_trait]
impl Command for ListCommands {
    fn name(&self) -> &str {
        "!commands"
    }

    fn description(&self) -> &str {
        "list every available directive"
    }

    async fn perform(&self, ctx: &CommandContext, _args: &str) -> Result<Option<String>> {
        Ok(Some(ctx.registry.describe_all().await))
    }
}

pub struct StartSelfPrompt;

#[async_trait]
impl Command for StartSelfPrompt {
    fn name(&self) -> &str {
        "!selfPrompt"
    }

    fn description(&self) -> &str {
        "start acting autonomously toward a goal, e.g. !selfPrompt(\"build a shelter\")"
    }

    async fn perform(&self, ctx: &CommandContext, args: &str) -> Result<Option<String>> {
        let goal = unquote(args);
        if goal.is_empty() {
            return Ok(Some(
                "A goal is required, e.g. !selfPrompt(\"explore the area\").".to_string(),
            ));
        }

        ctx.self_prompter.start(goal);
        ctx.history.set_self_prompt(Some(goal)).await?;
        Ok(None)
    }
}

pub struct StopSelfPrompt;

#[async_trait]
impl Command for StopSelfPrompt {
    fn name(&self) -> &str {
        STOP_SELF_PROMPT
    }

    fn description(&self) -> &str {
        "stop acting autonomously"
    }

    async fn perform(&self, ctx: &CommandContext, _args: &str) -> Result<Option<String>> {
        ctx.self_prompter.stop(true).await;
        ctx.history.set_self_prompt(None).await?;
        Ok(None)
    }
}

pub struct ShutUp;

#[async_trait]
impl Command for ShutUp {
    fn name(&self) -> &str {
        "!shutUp"
    }

    fn description(&self) -> &str {
        "go quiet until spoken to again"
    }

    async fn perform(&self, ctx: &CommandContext, _args: &str) -> Result<Option<String>> {
        ctx.gate.mute();
        ctx.self_prompter.stop(false).await;
        ctx.history.set_self_prompt(None).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ContextParts;

    #[tokio::test]
    async fn self_prompt_requires_a_goal() {
        let parts = ContextParts::new().await;
        let ctx = parts.context("golem");

        let output = parts.registry.execute(&ctx, "!selfPrompt").await.unwrap();
        assert!(output.unwrap().contains("goal is required"));
        assert!(!parts.self_prompter.is_active());
    }

    #[tokio::test]
    async fn self_prompt_starts_a_session_and_saves_the_goal() {
        let parts = ContextParts::new().await;
        let ctx = parts.context("golem");

        let output = parts
            .registry
            .execute(&ctx, "!selfPrompt(\"gather wood\")")
            .await
            .unwrap();
        assert_eq!(output, None);
        assert!(parts.self_prompter.is_active());
        assert_eq!(
            parts.history.saved_self_prompt(),
            Some("gather wood".to_string())
        );
    }

    #[tokio::test]
    async fn stop_self_prompt_clears_session_and_saved_goal() {
        let parts = ContextParts::new().await;
        let ctx = parts.context("golem");

        parts
            .registry
            .execute(&ctx, "!selfPrompt(\"gather wood\")")
            .await
            .unwrap();
        parts.registry.execute(&ctx, "!stopSelfPrompt").await.unwrap();

        assert!(!parts.self_prompter.is_active());
        assert_eq!(parts.history.saved_self_prompt(), None);
        // Stopping announces to the world.
        assert!(parts
            .world
            .messages()
            .iter()
            .any(|message| message.contains("stopped")));
    }

    #[tokio::test]
    async fn shut_up_mutes_and_stops_quietly() {
        let parts = ContextParts::new().await;
        let ctx = parts.context("golem");

        parts
            .registry
            .execute(&ctx, "!selfPrompt(\"gather wood\")")
            .await
            .unwrap();
        parts.registry.execute(&ctx, "!shutUp").await.unwrap();

        assert!(parts.gate.is_muted());
        assert!(!parts.self_prompter.is_active());
        // No chat announcement on the quiet path.
        assert!(parts
            .world
            .messages()
            .iter()
            .all(|message| !message.contains("stopped")));
    }

    #[tokio::test]
    async fn commands_listing_includes_the_builtins() {
        let parts = ContextParts::new().await;
        let ctx = parts.context("golem");

        let output = parts.registry.execute(&ctx, "!commands").await.unwrap();
        let listing = output.unwrap();
        assert!(listing.contains("!commands"));
        assert!(listing.contains("!selfPrompt"));
        assert!(listing.contains("!stopSelfPrompt"));
        assert!(listing.contains("!shutUp"));
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"gather wood\""), "gather wood");
        assert_eq!(unquote("'gather wood'"), "gather wood");
        assert_eq!(unquote("gather wood"), "gather wood");
        assert_eq!(unquote("  \"padded\"  "), "padded");
        assert_eq!(unquote("\"mismatched'"), "\"mismatched'");
        assert_eq!(unquote(""), "");
    }
}
