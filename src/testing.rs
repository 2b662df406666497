//! In-memory fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::context::{InteractionContext, InteractionResponder};
use crate::error::{GatewayError, HttpError};
use crate::events::GatewayEvent;
use crate::publisher::CommandApi;
use crate::registry::SlashCommand;
use crate::session::GatewaySession;
use crate::types::*;

// ---------------------------------------------------------------------------
// Interactions
// ---------------------------------------------------------------------------

pub fn command_interaction(name: &str, options: serde_json::Value) -> Interaction {
    serde_json::from_value(json!({
        "id": "100",
        "application_id": "app",
        "type": 2,
        "token": "interaction-token",
        "channel_id": "300",
        "user": { "id": "400", "username": "tester" },
        "data": { "id": "500", "name": name, "options": options }
    }))
    .expect("valid interaction")
}

pub fn component_interaction(custom_id: &str) -> Interaction {
    serde_json::from_value(json!({
        "id": "101",
        "application_id": "app",
        "type": 3,
        "token": "interaction-token",
        "data": { "custom_id": custom_id }
    }))
    .expect("valid interaction")
}

pub fn ready(application_id: Option<&str>) -> ReadyEvent {
    serde_json::from_value(json!({
        "v": 10,
        "user": { "id": "1", "username": "slash-bot", "discriminator": "0", "bot": true },
        "session_id": "session",
        "resume_gateway_url": "wss://resume.example",
        "application": application_id.map(|id| json!({ "id": id, "flags": 0 })),
    }))
    .expect("valid ready")
}

pub fn schema(name: &str) -> ApplicationCommand {
    ApplicationCommandBuilder::chat_input(name, format!("{} command", name)).build()
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Counts invocations and replies "ok".
pub struct CountingCommand {
    name: String,
    calls: AtomicUsize,
}

impl CountingCommand {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SlashCommand for CountingCommand {
    fn data(&self) -> ApplicationCommand {
        schema(&self.name)
    }

    async fn execute(&self, ctx: &mut InteractionContext) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.reply_text("ok").await?;
        Ok(())
    }
}

/// What a [`FailingCommand`] does before returning its error.
#[derive(Debug, Clone, Copy)]
pub enum FailAfter {
    Nothing,
    Defer,
    Reply,
}

pub struct FailingCommand {
    name: String,
    after: FailAfter,
}

impl FailingCommand {
    pub fn new(name: &str, after: FailAfter) -> Self {
        Self {
            name: name.to_string(),
            after,
        }
    }
}

#[async_trait]
impl SlashCommand for FailingCommand {
    fn data(&self) -> ApplicationCommand {
        schema(&self.name)
    }

    async fn execute(&self, ctx: &mut InteractionContext) -> anyhow::Result<()> {
        match self.after {
            FailAfter::Nothing => {}
            FailAfter::Defer => ctx.defer(false).await?,
            FailAfter::Reply => ctx.reply_text("partial").await?,
        }
        anyhow::bail!("handler exploded")
    }
}

/// Panics inside the handler instead of returning an error.
pub struct PanickingCommand {
    name: String,
}

impl PanickingCommand {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl SlashCommand for PanickingCommand {
    fn data(&self) -> ApplicationCommand {
        schema(&self.name)
    }

    async fn execute(&self, _ctx: &mut InteractionContext) -> anyhow::Result<()> {
        panic!("{} handler crashed", self.name)
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Response {
        kind: InteractionCallbackType,
        data: Option<InteractionCallbackData>,
    },
    FollowUp(InteractionCallbackData),
    Edit(InteractionCallbackData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub application_id: String,
    pub guild_id: Option<String>,
    pub commands: Vec<ApplicationCommand>,
}

/// Records every REST call; can be told to fail either family of calls.
#[derive(Default)]
pub struct RecordingHttp {
    sent: Mutex<Vec<Sent>>,
    published: Mutex<Vec<Published>>,
    fail_responses: bool,
    fail_publish: bool,
}

impl RecordingHttp {
    pub fn failing_responses() -> Self {
        Self {
            fail_responses: true,
            ..Self::default()
        }
    }

    pub fn failing_publish() -> Self {
        Self {
            fail_publish: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    fn respond(&self, sent: Sent) -> Result<(), HttpError> {
        if self.fail_responses {
            return Err(HttpError::Transport("connection reset".into()));
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }

    fn publish(
        &self,
        application_id: &str,
        guild_id: Option<&str>,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        if self.fail_publish {
            return Err(HttpError::Transport("network unreachable".into()));
        }
        self.published.lock().unwrap().push(Published {
            application_id: application_id.to_string(),
            guild_id: guild_id.map(str::to_string),
            commands: commands.to_vec(),
        });
        Ok(commands.to_vec())
    }
}

#[async_trait]
impl InteractionResponder for RecordingHttp {
    async fn create_interaction_response(
        &self,
        _interaction_id: &str,
        _interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        self.respond(Sent::Response {
            kind: response.kind,
            data: response.data.clone(),
        })
    }

    async fn create_followup_message(
        &self,
        _application_id: &str,
        _interaction_token: &str,
        data: &InteractionCallbackData,
    ) -> Result<(), HttpError> {
        self.respond(Sent::FollowUp(data.clone()))
    }

    async fn edit_original_interaction_response(
        &self,
        _application_id: &str,
        _interaction_token: &str,
        data: &InteractionCallbackData,
    ) -> Result<(), HttpError> {
        self.respond(Sent::Edit(data.clone()))
    }
}

#[async_trait]
impl CommandApi for RecordingHttp {
    async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        self.publish(application_id, Some(guild_id), commands)
    }

    async fn bulk_overwrite_global_commands(
        &self,
        application_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        self.publish(application_id, None, commands)
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// A session that logs in with a canned result and then replays events.
pub struct ScriptedSession {
    login: Option<Result<ReadyEvent, GatewayError>>,
    events: VecDeque<GatewayEvent>,
    pub tokens: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    pub fn new(login: Result<ReadyEvent, GatewayError>, events: Vec<GatewayEvent>) -> Self {
        Self {
            login: Some(login),
            events: events.into(),
            tokens: Arc::default(),
        }
    }
}

#[async_trait]
impl GatewaySession for ScriptedSession {
    async fn login(&mut self, token: &str) -> Result<ReadyEvent, GatewayError> {
        self.tokens.lock().unwrap().push(token.to_string());
        self.login.take().unwrap_or(Err(GatewayError::Ended))
    }

    async fn next_event(&mut self) -> Option<GatewayEvent> {
        self.events.pop_front()
    }
}
