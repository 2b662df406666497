//! Typed representations of the Discord API objects the bot touches.
//!
//! These mirror the Discord API docs so we can deserialize gateway events and
//! build REST bodies without touching `serde_json::Value` in the rest of the
//! codebase. Only the subset needed for login, command registration, and
//! interaction responses is modelled.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Discord IDs are snowflakes transmitted as strings in JSON.
pub type Snowflake = String;

/// Message flag that hides a reply from everyone but the invoking user.
pub const EPHEMERAL: u32 = 1 << 6;

// ---------------------------------------------------------------------------
// Gateway payload (the envelope that wraps every WS message)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayPayload {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub s: Option<u64>,
    pub t: Option<String>,
}

bitflags! {
    /// Gateway intents sent with IDENTIFY.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GatewayIntents: u32 {
        const GUILDS = 1;
        const GUILD_MESSAGES = 1 << 9;
        const MESSAGE_CONTENT = 1 << 15;
    }
}

impl Default for GatewayIntents {
    fn default() -> Self {
        Self::GUILDS | Self::GUILD_MESSAGES | Self::MESSAGE_CONTENT
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    pub discriminator: Option<String>,
    #[serde(default)]
    pub bot: bool,
    pub global_name: Option<String>,
}

impl User {
    /// `Username#Discriminator` or just `Username` for the new username system.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some("0") | None => self.username.clone(),
            Some(disc) => format!("{}#{}", self.username, disc),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildMember {
    pub user: Option<User>,
}

// ---------------------------------------------------------------------------
// READY event payload
// ---------------------------------------------------------------------------

/// The authenticated identity of a gateway session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyEvent {
    pub v: u8,
    pub user: User,
    pub session_id: String,
    pub resume_gateway_url: String,
    pub application: Option<ReadyApplication>,
}

impl ReadyEvent {
    pub fn application_id(&self) -> Option<&str> {
        self.application.as_ref().map(|app| app.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyApplication {
    pub id: Snowflake,
}

// ---------------------------------------------------------------------------
// Interactions
// ---------------------------------------------------------------------------

/// Top-level interaction received via INTERACTION_CREATE.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Interaction {
    pub id: Snowflake,
    pub application_id: Snowflake,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub data: Option<InteractionData>,
    pub member: Option<GuildMember>,
    pub user: Option<User>,
    pub token: String,
}

impl Interaction {
    /// Convenience: the user who triggered the interaction.
    pub fn author(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }

    /// The invoked command name, if this is a slash-command invocation.
    pub fn command_name(&self) -> Option<&str> {
        if self.kind != InteractionType::ApplicationCommand {
            return None;
        }
        self.data.as_ref()?.name.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum InteractionType {
    Ping = 1,
    ApplicationCommand = 2,
    MessageComponent = 3,
    ApplicationCommandAutocomplete = 4,
    ModalSubmit = 5,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionData {
    pub id: Option<Snowflake>,
    pub name: Option<String>,
    /// For components: the developer-defined `custom_id`.
    pub custom_id: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandDataOption>,
}

/// An argument the user supplied when invoking a command.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandDataOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CommandOptionType,
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub options: Vec<CommandDataOption>,
}

// ---------------------------------------------------------------------------
// Interaction responses (what we send back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: InteractionCallbackType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionCallbackData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum InteractionCallbackType {
    Pong = 1,
    ChannelMessageWithSource = 4,
    DeferredChannelMessageWithSource = 5,
    DeferredUpdateMessage = 6,
    UpdateMessage = 7,
    ApplicationCommandAutocompleteResult = 8,
    Modal = 9,
}

/// Message body shared by initial responses, follow-ups, and edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionCallbackData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
}

impl InteractionCallbackData {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            flags: None,
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.flags = Some(self.flags.unwrap_or(0) | EPHEMERAL);
        self
    }

    pub fn is_ephemeral(&self) -> bool {
        self.flags.is_some_and(|f| f & EPHEMERAL != 0)
    }
}

// ---------------------------------------------------------------------------
// Slash command registration payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Snowflake>,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ApplicationCommandOption>,
    #[serde(rename = "type", default)]
    pub kind: CommandType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CommandType {
    #[default]
    ChatInput = 1,
    User = 2,
    Message = 3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCommandOption {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: CommandOptionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ApplicationCommandOptionChoice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CommandOptionType {
    SubCommand = 1,
    SubCommandGroup = 2,
    String = 3,
    Integer = 4,
    Boolean = 5,
    User = 6,
    Channel = 7,
    Role = 8,
    Mentionable = 9,
    Number = 10,
    Attachment = 11,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCommandOptionChoice {
    pub name: String,
    pub value: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Ergonomic builder for [`ApplicationCommand`].
///
/// ```
/// use slash_bot::types::{ApplicationCommandBuilder, CommandOptionType};
///
/// let cmd = ApplicationCommandBuilder::chat_input("echo", "Repeat a message")
///     .option("message", "Text to repeat", CommandOptionType::String, true)
///     .build();
/// assert_eq!(cmd.options.len(), 1);
/// ```
pub struct ApplicationCommandBuilder {
    inner: ApplicationCommand,
}

impl ApplicationCommandBuilder {
    /// Start building a CHAT_INPUT (slash) command.
    pub fn chat_input(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            inner: ApplicationCommand {
                id: None,
                name: name.into(),
                description: description.into(),
                options: Vec::new(),
                kind: CommandType::ChatInput,
            },
        }
    }

    /// Append an option.
    pub fn option(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: CommandOptionType,
        required: bool,
    ) -> Self {
        self.inner.options.push(ApplicationCommandOption {
            name: name.into(),
            description: description.into(),
            kind,
            required,
            choices: Vec::new(),
        });
        self
    }

    /// Attach a choice to the most recently added option.
    pub fn choice(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if let Some(option) = self.inner.options.last_mut() {
            option.choices.push(ApplicationCommandOptionChoice {
                name: name.into(),
                value: value.into(),
            });
        }
        self
    }

    pub fn build(self) -> ApplicationCommand {
        self.inner
    }
}
