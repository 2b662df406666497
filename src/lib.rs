//! A Discord bot that publishes slash commands and dispatches interactions.
//!
//! The core (registry, dispatcher, publisher, orchestrator) talks to Discord
//! only through the [`session::GatewaySession`], [`publisher::CommandApi`],
//! and [`context::InteractionResponder`] traits. The `io` feature provides
//! the real implementations in [`gateway`] and [`http`].

pub mod bot;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
#[cfg(feature = "io")]
pub mod gateway;
#[cfg(feature = "io")]
pub mod http;
pub mod publisher;
pub mod registry;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

/// Run the bot with the built-in commands until the gateway session ends.
///
/// Reads `DISCORD_TOKEN` and `GUILD_ID` from the environment (and `.env`).
#[cfg(feature = "io")]
pub async fn run() -> Result<(), error::BotError> {
    use std::sync::Arc;

    dotenv::dotenv().ok();

    let config = config::BotConfig::from_env()?;
    let http = Arc::new(http::DiscordHttpClient::new(&config.token));
    let session = gateway::Gateway::new(config.intents);

    bot::Bot::new(config, commands::default_registry(), session, http)
        .start()
        .await
}
