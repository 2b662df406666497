//! The orchestrator: login, command publication, and the event loop.
//!
//! Startup is `login → publish → ready`. Login failures are fatal; publish
//! failures are logged and startup carries on with whatever command set
//! Discord already has. After startup every interaction is dispatched on its
//! own task so a slow handler never holds up the loop.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, trace, warn};

use crate::config::BotConfig;
use crate::context::InteractionResponder;
use crate::dispatcher::Dispatcher;
use crate::error::BotError;
use crate::events::GatewayEvent;
use crate::publisher::{self, CommandApi, CommandTarget};
use crate::registry::CommandRegistry;
use crate::session::GatewaySession;
use crate::types::ReadyEvent;

pub struct Bot<S, H> {
    config: BotConfig,
    session: S,
    http: Arc<H>,
    dispatcher: Dispatcher,
}

impl<S, H> Bot<S, H>
where
    S: GatewaySession,
    H: CommandApi + InteractionResponder + 'static,
{
    pub fn new(config: BotConfig, registry: CommandRegistry, session: S, http: Arc<H>) -> Self {
        let responder: Arc<dyn InteractionResponder> = http.clone();
        Self {
            config,
            session,
            dispatcher: Dispatcher::new(Arc::new(registry), responder),
            http,
        }
    }

    /// Log in and publish commands.
    ///
    /// Returns the session identity once the bot is ready to serve
    /// interactions.
    pub async fn init(&mut self) -> Result<ReadyEvent, BotError> {
        let ready = self.session.login(&self.config.token).await?;
        info!(user = %ready.user.tag(), "logged in");

        let application_id = ready
            .application_id()
            .ok_or(BotError::MissingApplicationId)?;

        let target = CommandTarget::from_guild_id(self.config.guild_id.as_deref());
        let schemas = self.dispatcher.registry().schemas();
        if let Err(e) =
            publisher::publish(self.http.as_ref(), application_id, &schemas, &target).await
        {
            error!(error = %e, cause = %e.source, "error registering slash commands");
        }

        info!("bot is running");
        Ok(ready)
    }

    /// Consume gateway events until the session ends.
    ///
    /// Interactions still in flight when the stream ends are awaited before
    /// returning.
    pub async fn run(mut self) {
        let mut in_flight = JoinSet::new();

        while let Some(event) = self.session.next_event().await {
            match event {
                GatewayEvent::Ready(ready) => {
                    info!(
                        user = %ready.user.tag(),
                        session_id = %ready.session_id,
                        "session re-established"
                    );
                }
                GatewayEvent::InteractionCreate(interaction) => {
                    let dispatcher = self.dispatcher.clone();
                    in_flight.spawn(async move { dispatcher.dispatch(interaction).await });
                }
                GatewayEvent::Error(e) => {
                    error!(error = %e, "Discord client error");
                }
                GatewayEvent::Unknown {
                    event_name: Some(ref name),
                    ..
                } => {
                    trace!(event = %name, "unhandled gateway event");
                }
                _ => {}
            }

            while let Some(finished) = in_flight.try_join_next() {
                log_join(finished);
            }
        }

        warn!("event stream ended, bot shutting down");
        while let Some(finished) = in_flight.join_next().await {
            log_join(finished);
        }
    }

    /// [`init`](Self::init) followed by [`run`](Self::run).
    pub async fn start(mut self) -> Result<(), BotError> {
        self.init().await?;
        self.run().await;
        Ok(())
    }
}

fn log_join<T>(result: Result<T, tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "interaction task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{default_registry, Echo, Ping};
    use crate::error::GatewayError;
    use crate::testing::*;
    use crate::types::GatewayIntents;
    use serde_json::json;

    fn config(guild_id: Option<&str>) -> BotConfig {
        BotConfig {
            token: "bot-token".into(),
            guild_id: guild_id.map(str::to_string),
            intents: GatewayIntents::default(),
        }
    }

    #[tokio::test]
    async fn init_logs_in_with_token_and_publishes_globally() {
        let http = Arc::new(RecordingHttp::default());
        let session = ScriptedSession::new(Ok(ready(Some("app"))), Vec::new());
        let tokens = session.tokens.clone();
        let mut bot = Bot::new(config(None), default_registry(), session, http.clone());

        let identity = bot.init().await.unwrap();

        assert_eq!(identity.application_id(), Some("app"));
        assert_eq!(*tokens.lock().unwrap(), vec!["bot-token".to_string()]);
        let published = http.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].guild_id, None);
        let names: Vec<_> = published[0].commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "ping"]);
    }

    #[tokio::test]
    async fn guild_id_publishes_to_guild() {
        let http = Arc::new(RecordingHttp::default());
        let session = ScriptedSession::new(Ok(ready(Some("app"))), Vec::new());
        let mut bot = Bot::new(config(Some("42")), default_registry(), session, http.clone());

        bot.init().await.unwrap();

        let published = http.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].guild_id.as_deref(), Some("42"));
        assert_eq!(published[0].commands.len(), 2);
    }

    #[tokio::test]
    async fn publish_failure_does_not_block_ready() {
        let http = Arc::new(RecordingHttp::failing_publish());
        let session = ScriptedSession::new(Ok(ready(Some("app"))), Vec::new());
        let mut bot = Bot::new(config(None), default_registry(), session, http.clone());

        let identity = bot.init().await.unwrap();

        assert_eq!(identity.user.username, "slash-bot");
        assert!(http.published().is_empty());
    }

    #[tokio::test]
    async fn login_failure_is_fatal() {
        let http = Arc::new(RecordingHttp::default());
        let session = ScriptedSession::new(Err(GatewayError::AuthenticationFailed), Vec::new());
        let mut bot = Bot::new(config(None), default_registry(), session, http.clone());

        let err = bot.init().await.unwrap_err();

        assert!(matches!(err, BotError::Login(GatewayError::AuthenticationFailed)));
        assert!(http.published().is_empty());
    }

    #[tokio::test]
    async fn missing_application_id_is_fatal() {
        let http = Arc::new(RecordingHttp::default());
        let session = ScriptedSession::new(Ok(ready(None)), Vec::new());
        let mut bot = Bot::new(config(None), default_registry(), session, http.clone());

        let err = bot.init().await.unwrap_err();

        assert!(matches!(err, BotError::MissingApplicationId));
        assert!(http.published().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_ping_and_unknown() {
        let http = Arc::new(RecordingHttp::default());
        let ping = Arc::new(CountingCommand::new("ping"));
        let mut registry = CommandRegistry::new();
        registry.insert(crate::registry::CommandDescriptor::new(ping.clone()));
        registry.register(Echo);

        let session = ScriptedSession::new(
            Ok(ready(Some("app"))),
            vec![
                GatewayEvent::InteractionCreate(command_interaction("ping", json!([]))),
                GatewayEvent::Error("connection reset".into()),
                GatewayEvent::InteractionCreate(command_interaction("unknown", json!([]))),
            ],
        );
        let bot = Bot::new(config(None), registry, session, http.clone());

        bot.start().await.unwrap();

        let published = http.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].guild_id, None);
        assert_eq!(published[0].commands.len(), 2);

        assert_eq!(ping.calls(), 1);
        // Only the ping reply went out; the unknown command produced nothing.
        assert_eq!(http.sent().len(), 1);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_loop() {
        let http = Arc::new(RecordingHttp::default());
        let mut registry = CommandRegistry::new();
        registry.register(FailingCommand::new("boom", FailAfter::Nothing));
        registry.register(Ping);

        let session = ScriptedSession::new(
            Ok(ready(Some("app"))),
            vec![
                GatewayEvent::InteractionCreate(command_interaction("boom", json!([]))),
                GatewayEvent::InteractionCreate(command_interaction("ping", json!([]))),
            ],
        );

        Bot::new(config(None), registry, session, http.clone())
            .start()
            .await
            .unwrap();

        let contents: Vec<String> = http
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Response { data: Some(d), .. } => d.content,
                _ => None,
            })
            .collect();
        assert_eq!(contents.len(), 2);
        assert!(contents.contains(&crate::dispatcher::ERROR_MESSAGE.to_string()));
        assert!(contents.contains(&"🏓 Pong!".to_string()));
    }

    #[tokio::test]
    async fn panicking_handler_still_gets_one_error_reply() {
        let http = Arc::new(RecordingHttp::default());
        let mut registry = CommandRegistry::new();
        registry.register(PanickingCommand::new("crash"));
        registry.register(Ping);

        let session = ScriptedSession::new(
            Ok(ready(Some("app"))),
            vec![
                GatewayEvent::InteractionCreate(command_interaction("crash", json!([]))),
                GatewayEvent::InteractionCreate(command_interaction("ping", json!([]))),
            ],
        );

        Bot::new(config(None), registry, session, http.clone())
            .start()
            .await
            .unwrap();

        let errors: Vec<_> = http
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Response { data: Some(d), .. } => Some(d),
                _ => None,
            })
            .filter(|d| d.content.as_deref() == Some(crate::dispatcher::ERROR_MESSAGE))
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_ephemeral());
        assert_eq!(http.sent().len(), 2);
    }
}
