//! Built-in slash commands.

use anyhow::Context as _;
use async_trait::async_trait;

use crate::context::InteractionContext;
use crate::registry::{CommandRegistry, SlashCommand};
use crate::types::*;

/// `/ping`: liveness check.
pub struct Ping;

#[async_trait]
impl SlashCommand for Ping {
    fn data(&self) -> ApplicationCommand {
        ApplicationCommandBuilder::chat_input("ping", "Check that the bot is alive").build()
    }

    async fn execute(&self, ctx: &mut InteractionContext) -> anyhow::Result<()> {
        ctx.reply_text("🏓 Pong!").await?;
        Ok(())
    }
}

/// `/echo message:<text> [ephemeral:<bool>]`: repeat the message back.
pub struct Echo;

#[async_trait]
impl SlashCommand for Echo {
    fn data(&self) -> ApplicationCommand {
        ApplicationCommandBuilder::chat_input("echo", "Repeat a message back")
            .option("message", "Text to repeat", CommandOptionType::String, true)
            .option(
                "ephemeral",
                "Only show the reply to you",
                CommandOptionType::Boolean,
                false,
            )
            .build()
    }

    async fn execute(&self, ctx: &mut InteractionContext) -> anyhow::Result<()> {
        let message = ctx
            .option_str("message")
            .context("missing required option `message`")?
            .to_string();

        let mut data = InteractionCallbackData::text(message);
        if ctx.option_bool("ephemeral").unwrap_or(false) {
            data = data.ephemeral();
        }
        ctx.reply(data).await?;
        Ok(())
    }
}

/// A registry holding every built-in command.
pub fn default_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(Ping);
    registry.register(Echo);
    registry
}
