use std::{future::Future, pin::Pin, sync::Arc};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::descriptor::DebugAdapterDescriptorFactory;

pub type CommandFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Handler invoked with the command's json arguments
pub type CommandHandler = Arc<dyn Fn(Vec<Value>) -> CommandFuture + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("No debug adapter registered for type `{0}`")]
    UnknownDebugType(String),
}

/// Explicit bindings built once at start-up
#[derive(Default)]
pub struct Registry {
    debug_types: IndexMap<String, Arc<dyn DebugAdapterDescriptorFactory>>,
    commands: IndexMap<String, CommandHandler>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("debug_types", &self.debug_types.keys().collect::<Vec<_>>())
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_debug_type(
        &mut self,
        debug_type: &str,
        factory: Arc<dyn DebugAdapterDescriptorFactory>,
    ) {
        debug!("Registering debug type `{debug_type}`");
        self.debug_types.insert(debug_type.to_string(), factory);
    }

    pub fn register_command<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        debug!("Registering command `{name}`");
        let handler: CommandHandler = Arc::new(move |args| -> CommandFuture { Box::pin(handler(args)) });
        self.commands.insert(name.to_string(), handler);
    }

    /// Factory for a debug type
    ///
    /// # Errors
    ///
    /// This function will return an error if nothing is registered for the type
    pub fn descriptor_factory(
        &self,
        debug_type: &str,
    ) -> Result<Arc<dyn DebugAdapterDescriptorFactory>, RegistryError> {
        self.debug_types
            .get(debug_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDebugType(debug_type.to_string()))
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Runs a registered command
    ///
    /// # Errors
    ///
    /// This function will return an error if the command is unknown or fails
    pub async fn execute(&self, name: &str, args: Vec<Value>) -> anyhow::Result<()> {
        let handler = self
            .commands
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCommand(name.to_string()))?;
        debug!("Executing command `{name}`");
        handler(args).await
    }
}
