//! The command registry: slash command name → descriptor.
//!
//! Filled once during startup and then shared read-only (behind an `Arc`)
//! with the dispatcher, so no locking is needed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::InteractionContext;
use crate::types::ApplicationCommand;

/// A slash command implementation.
///
/// `data` describes the command to Discord; its `name` is the key the
/// dispatcher routes on. `execute` runs once per invocation.
#[async_trait]
pub trait SlashCommand: Send + Sync {
    fn data(&self) -> ApplicationCommand;

    async fn execute(&self, ctx: &mut InteractionContext) -> anyhow::Result<()>;
}

/// A registered command: the schema captured at registration plus its
/// handler.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub schema: ApplicationCommand,
    pub handler: Arc<dyn SlashCommand>,
}

impl CommandDescriptor {
    pub fn new(handler: Arc<dyn SlashCommand>) -> Self {
        Self {
            schema: handler.data(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.schema.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its schema name.
    ///
    /// A command already registered under the same name is replaced and
    /// returned.
    pub fn register(&mut self, command: impl SlashCommand + 'static) -> Option<CommandDescriptor> {
        self.insert(CommandDescriptor::new(Arc::new(command)))
    }

    pub fn insert(&mut self, descriptor: CommandDescriptor) -> Option<CommandDescriptor> {
        let name = descriptor.name().to_string();
        let previous = self.commands.insert(name.clone(), descriptor);
        if previous.is_some() {
            warn!(command = %name, "command registered twice, keeping the latest");
        } else {
            debug!(command = %name, "registered command");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Every registered schema, sorted by name.
    pub fn schemas(&self) -> Vec<ApplicationCommand> {
        let mut schemas: Vec<ApplicationCommand> =
            self.commands.values().map(|d| d.schema.clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingCommand;
    use static_assertions::assert_impl_all;

    assert_impl_all!(CommandRegistry: Send, Sync);
    assert_impl_all!(CommandDescriptor: Send, Sync, Clone);

    #[test]
    fn get_returns_the_registered_descriptor() {
        let mut registry = CommandRegistry::new();
        let ping = Arc::new(CountingCommand::new("ping"));
        registry.insert(CommandDescriptor::new(ping.clone()));

        let found = registry.get("ping").expect("ping registered");
        assert_eq!(found.name(), "ping");
        let handler: Arc<dyn SlashCommand> = ping;
        assert!(Arc::ptr_eq(&found.handler, &handler));
    }

    #[test]
    fn get_unknown_is_none() {
        let registry = CommandRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_name_last_write_wins() {
        let mut registry = CommandRegistry::new();
        let first: Arc<dyn SlashCommand> = Arc::new(CountingCommand::new("ping"));
        let second: Arc<dyn SlashCommand> = Arc::new(CountingCommand::new("ping"));

        assert!(registry.insert(CommandDescriptor::new(first.clone())).is_none());
        let replaced = registry
            .insert(CommandDescriptor::new(second.clone()))
            .expect("first was replaced");

        assert!(Arc::ptr_eq(&replaced.handler, &first));
        assert!(Arc::ptr_eq(&registry.get("ping").unwrap().handler, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn schemas_cover_every_command_sorted() {
        let mut registry = CommandRegistry::new();
        registry.register(CountingCommand::new("ping"));
        registry.register(CountingCommand::new("echo"));

        let names: Vec<String> = registry.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo", "ping"]);
    }
}
