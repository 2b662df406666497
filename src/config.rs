//! Process configuration read from the environment.

use crate::error::ConfigError;
use crate::types::GatewayIntents;

pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const GUILD_VAR: &str = "GUILD_ID";

#[derive(Clone)]
pub struct BotConfig {
    pub token: String,
    /// Publish commands to this guild only. `None` publishes globally.
    pub guild_id: Option<String>,
    pub intents: GatewayIntents,
}

impl BotConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Blank values count as unset, so `GUILD_ID=` selects global
    /// registration.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = non_empty(TOKEN_VAR).ok_or(ConfigError::Missing(TOKEN_VAR))?;

        Ok(Self {
            token,
            guild_id: non_empty(GUILD_VAR),
            intents: GatewayIntents::default(),
        })
    }
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("intents", &self.intents)
            .finish()
    }
}
