//! Publishing slash command schemas to Discord.
//!
//! Publishing is a bulk overwrite: the request body is the complete command
//! list, and Discord deletes any previously registered command that is not
//! in it.

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::error::{HttpError, PublishError};
use crate::types::{ApplicationCommand, Snowflake};

/// Where a command set is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    /// One guild only; updates show up immediately. Used while developing.
    Guild(Snowflake),
    /// Every guild the bot is in; propagation can take up to an hour.
    Global,
}

impl CommandTarget {
    pub fn from_guild_id(guild_id: Option<&str>) -> Self {
        match guild_id {
            Some(id) => CommandTarget::Guild(id.to_string()),
            None => CommandTarget::Global,
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::Guild(id) => write!(f, "guild {}", id),
            CommandTarget::Global => f.write_str("global scope"),
        }
    }
}

/// The registration endpoints.
#[async_trait]
pub trait CommandApi: Send + Sync {
    /// `PUT /applications/{app}/guilds/{guild}/commands`
    async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError>;

    /// `PUT /applications/{app}/commands`
    async fn bulk_overwrite_global_commands(
        &self,
        application_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError>;
}

/// Replace the application's commands at `target` with `commands`.
///
/// Returns the number of commands Discord reports as registered.
pub async fn publish<A>(
    api: &A,
    application_id: &str,
    commands: &[ApplicationCommand],
    target: &CommandTarget,
) -> Result<usize, PublishError>
where
    A: CommandApi + ?Sized,
{
    let result = match target {
        CommandTarget::Guild(guild_id) => {
            api.bulk_overwrite_guild_commands(application_id, guild_id, commands)
                .await
        }
        CommandTarget::Global => {
            api.bulk_overwrite_global_commands(application_id, commands)
                .await
        }
    };

    let registered = result.map_err(|source| PublishError {
        target: target.clone(),
        count: commands.len(),
        source,
    })?;

    match target {
        CommandTarget::Guild(guild_id) => {
            info!(count = registered.len(), guild = %guild_id, "registered guild slash commands");
        }
        CommandTarget::Global => {
            info!(
                count = registered.len(),
                "registered global slash commands (may take up to 1 hour to propagate)"
            );
        }
    }

    Ok(registered.len())
}
