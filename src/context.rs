//! Per-invocation handle passed to command handlers.
//!
//! An [`InteractionContext`] wraps one inbound [`Interaction`] and tracks
//! whether it has been acknowledged. Discord accepts exactly one initial
//! response (a reply or a defer); everything after that goes through the
//! follow-up / edit webhooks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HttpError, ResponseError};
use crate::types::*;

/// The REST calls needed to answer an interaction.
#[async_trait]
pub trait InteractionResponder: Send + Sync {
    /// Send the initial response (`POST /interactions/{id}/{token}/callback`).
    async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError>;

    /// Send an additional message (`POST /webhooks/{app}/{token}`).
    async fn create_followup_message(
        &self,
        application_id: &str,
        interaction_token: &str,
        data: &InteractionCallbackData,
    ) -> Result<(), HttpError>;

    /// Edit the initial response (`PATCH /webhooks/{app}/{token}/messages/@original`).
    async fn edit_original_interaction_response(
        &self,
        application_id: &str,
        interaction_token: &str,
        data: &InteractionCallbackData,
    ) -> Result<(), HttpError>;
}

pub struct InteractionContext {
    interaction: Interaction,
    responder: Arc<dyn InteractionResponder>,
    replied: bool,
    deferred: bool,
}

impl InteractionContext {
    pub fn new(interaction: Interaction, responder: Arc<dyn InteractionResponder>) -> Self {
        Self {
            interaction,
            responder,
            replied: false,
            deferred: false,
        }
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn command_name(&self) -> &str {
        self.interaction.command_name().unwrap_or_default()
    }

    pub fn user(&self) -> Option<&User> {
        self.interaction.author()
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    /// Raw value of a top-level option supplied by the user.
    pub fn option(&self, name: &str) -> Option<&serde_json::Value> {
        self.interaction
            .data
            .as_ref()?
            .options
            .iter()
            .find(|o| o.name == name)?
            .value
            .as_ref()
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.option(name)?.as_str()
    }

    pub fn option_i64(&self, name: &str) -> Option<i64> {
        self.option(name)?.as_i64()
    }

    pub fn option_bool(&self, name: &str) -> Option<bool> {
        self.option(name)?.as_bool()
    }

    // ------------------------------------------------------------------
    // Acknowledgement state
    // ------------------------------------------------------------------

    pub fn is_replied(&self) -> bool {
        self.replied
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    fn is_acknowledged(&self) -> bool {
        self.replied || self.deferred
    }

    // ------------------------------------------------------------------
    // Responses
    // ------------------------------------------------------------------

    /// Send the initial response.
    pub async fn reply(&mut self, data: InteractionCallbackData) -> Result<(), ResponseError> {
        if self.is_acknowledged() {
            return Err(ResponseError::AlreadyAcknowledged);
        }
        let response = InteractionResponse {
            kind: InteractionCallbackType::ChannelMessageWithSource,
            data: Some(data),
        };
        self.responder
            .create_interaction_response(&self.interaction.id, &self.interaction.token, &response)
            .await?;
        self.replied = true;
        Ok(())
    }

    pub async fn reply_text(&mut self, content: impl Into<String>) -> Result<(), ResponseError> {
        self.reply(InteractionCallbackData::text(content)).await
    }

    pub async fn reply_ephemeral(
        &mut self,
        content: impl Into<String>,
    ) -> Result<(), ResponseError> {
        self.reply(InteractionCallbackData::text(content).ephemeral())
            .await
    }

    /// Acknowledge now and answer later with [`follow_up`](Self::follow_up)
    /// or [`edit_reply`](Self::edit_reply).
    pub async fn defer(&mut self, ephemeral: bool) -> Result<(), ResponseError> {
        if self.is_acknowledged() {
            return Err(ResponseError::AlreadyAcknowledged);
        }
        let response = InteractionResponse {
            kind: InteractionCallbackType::DeferredChannelMessageWithSource,
            data: ephemeral.then(|| InteractionCallbackData::default().ephemeral()),
        };
        self.responder
            .create_interaction_response(&self.interaction.id, &self.interaction.token, &response)
            .await?;
        self.deferred = true;
        debug!(command = self.command_name(), "deferred interaction");
        Ok(())
    }

    pub async fn follow_up(&mut self, data: InteractionCallbackData) -> Result<(), ResponseError> {
        if !self.is_acknowledged() {
            return Err(ResponseError::NotAcknowledged);
        }
        self.responder
            .create_followup_message(
                &self.interaction.application_id,
                &self.interaction.token,
                &data,
            )
            .await?;
        Ok(())
    }

    pub async fn edit_reply(&mut self, data: InteractionCallbackData) -> Result<(), ResponseError> {
        if !self.is_acknowledged() {
            return Err(ResponseError::NotAcknowledged);
        }
        self.responder
            .edit_original_interaction_response(
                &self.interaction.application_id,
                &self.interaction.token,
                &data,
            )
            .await?;
        self.replied = true;
        Ok(())
    }
}
