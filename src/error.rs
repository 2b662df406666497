//! Error types for every layer of the bot.
//!
//! Startup errors ([`ConfigError`], [`GatewayError`], [`BotError`]) are fatal.
//! [`PublishError`] is logged and discarded by the orchestrator, and
//! [`ResponseError`] surfaces to command handlers.

use thiserror::Error;

use crate::publisher::CommandTarget;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
}

/// Failures of the gateway session.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to connect to gateway: {0}")]
    Connect(String),
    #[error("gateway handshake failed: {0}")]
    Handshake(String),
    /// Close code 4004: the token was rejected.
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("gateway closed the session with fatal code {code}: {reason}")]
    Fatal { code: u16, reason: &'static str },
    #[error("exceeded {0} reconnect attempts")]
    ReconnectExhausted(u32),
    #[error("gateway session ended before READY")]
    Ended,
}

/// Failures of a REST call.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Non-success status from Discord.
    #[error("Discord API error {status} on {route}: {body}")]
    Api {
        status: u16,
        body: String,
        route: String,
    },
    /// Transport / network error.
    #[error("HTTP transport error: {0}")]
    Transport(String),
    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failures of an interaction response made through a context.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("interaction was already replied to or deferred")]
    AlreadyAcknowledged,
    #[error("interaction has not been replied to or deferred yet")]
    NotAcknowledged,
    #[error(transparent)]
    Http(#[from] HttpError),
}

#[derive(Debug, Error)]
#[error("failed to publish {count} commands to {target}")]
pub struct PublishError {
    pub target: CommandTarget,
    pub count: usize,
    #[source]
    pub source: HttpError,
}

/// Fatal errors from [`crate::bot::Bot`].
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("login failed: {0}")]
    Login(#[from] GatewayError),
    #[error("application ID is missing from the READY payload")]
    MissingApplicationId,
}
