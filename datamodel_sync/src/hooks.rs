//! Post-sync hooks
//!
//! Hooks run after every module transaction has committed, e.g. to
//! regenerate an ORM client from the new schema. The engine does not know
//! what they do; a failing hook is reported but the schema stays committed.

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::HooksConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait PostSyncHook: Send + Sync {
    fn name(&self) -> &str;

    async fn after_sync(&self) -> Result<()>;
}

/// Runs one shell command
#[derive(Debug, Clone)]
pub struct CommandHook {
    command: String,
}

impl CommandHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }

    /// One hook per `[hooks] after_sync` entry, in order
    pub fn from_config(config: &HooksConfig) -> Vec<Box<dyn PostSyncHook>> {
        config
            .after_sync
            .iter()
            .filter(|command| !command.trim().is_empty())
            .map(|command| Box::new(CommandHook::new(command.as_str())) as Box<dyn PostSyncHook>)
            .collect()
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&self.command);
            command
        } else {
            let mut command = Command::new("sh");
            command.arg("-c").arg(&self.command);
            command
        }
    }
}

#[async_trait]
impl PostSyncHook for CommandHook {
    fn name(&self) -> &str {
        &self.command
    }

    async fn after_sync(&self) -> Result<()> {
        tracing::info!(hook = %self.command, "Running post-sync hook");

        let status = self
            .shell()
            .status()
            .await
            .map_err(|e| Error::HookError(format!("Could not start '{}': {}", self.command, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::HookError(format!("'{}' exited with {}", self.command, status)))
        }
    }
}

/// Run hooks in order, stopping at the first failure
pub async fn run_hooks(hooks: &[Box<dyn PostSyncHook>]) -> Result<()> {
    for hook in hooks {
        hook.after_sync().await?;
    }
    Ok(())
}
