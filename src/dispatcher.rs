//! Routes inbound interactions to registered slash commands.
//!
//! The dispatcher is the error boundary for command handlers: whatever a
//! handler returns, the invoking user gets a terminal acknowledgement.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, info};

use crate::context::{InteractionContext, InteractionResponder};
use crate::registry::CommandRegistry;
use crate::types::{Interaction, InteractionCallbackData};

/// Shown to the user when a handler fails.
pub const ERROR_MESSAGE: &str = "There was an error while executing this command!";

/// What happened to one dispatched interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a slash-command invocation.
    Ignored,
    /// No command is registered under this name.
    UnknownCommand(String),
    /// The handler returned `Ok`.
    Handled,
    /// The handler failed. `notified` is whether the error reply was delivered.
    Failed { notified: bool },
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    responder: Arc<dyn InteractionResponder>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>, responder: Arc<dyn InteractionResponder>) -> Self {
        Self {
            registry,
            responder,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run the command this interaction invokes.
    ///
    /// Never fails: handler errors are logged and answered with an ephemeral
    /// [`ERROR_MESSAGE`].
    pub async fn dispatch(&self, interaction: Interaction) -> DispatchOutcome {
        let Some(name) = interaction.command_name() else {
            debug!(kind = ?interaction.kind, "ignoring non-command interaction");
            return DispatchOutcome::Ignored;
        };
        let name = name.to_string();

        let Some(command) = self.registry.get(&name) else {
            debug!(command = %name, "no handler registered");
            return DispatchOutcome::UnknownCommand(name);
        };
        let handler = Arc::clone(&command.handler);

        let user = interaction.author().map(|u| u.tag()).unwrap_or_default();
        info!(command = %name, user = %user, "executing command");

        let mut ctx = InteractionContext::new(interaction, Arc::clone(&self.responder));
        let result = AssertUnwindSafe(handler.execute(&mut ctx))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(())) => return DispatchOutcome::Handled,
            Ok(Err(e)) => error!(command = %name, error = %e, "error executing command"),
            Err(panic) => error!(
                command = %name,
                panic = panic_message(panic.as_ref()),
                "command handler panicked"
            ),
        }
        DispatchOutcome::Failed {
            notified: notify_failure(&mut ctx).await,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Tell the user the command failed, choosing reply or follow-up by whether
/// the handler already acknowledged the interaction.
async fn notify_failure(ctx: &mut InteractionContext) -> bool {
    let data = InteractionCallbackData::text(ERROR_MESSAGE).ephemeral();
    let result = if ctx.is_replied() || ctx.is_deferred() {
        ctx.follow_up(data).await
    } else {
        ctx.reply(data).await
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            error!(command = ctx.command_name(), error = %e, "failed to send error reply");
            false
        }
    }
}
