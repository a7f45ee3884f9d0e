mod context;
mod services;

pub use context::CommandContext;

use crate::Command;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// What a command produced: JSON for `--json`, lines for humans.
pub struct CommandOutcome {
    pub data: Value,
    pub lines: Vec<String>,
    pub success: bool,
}

impl CommandOutcome {
    pub fn from_value<T: Serialize>(value: &T, success: bool) -> Result<Self> {
        Ok(Self {
            data: serde_json::to_value(value)?,
            lines: Vec::new(),
            success,
        })
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }
}

pub async fn execute(ctx: &CommandContext, command: Command) -> Result<CommandOutcome> {
    match command {
        Command::Reindex { kinds, workers, .. } => {
            services::reindex::run(ctx, &kinds, workers).await
        }
        Command::Reconcile { kind, .. } => services::reconcile::run(ctx, &kind).await,
        Command::Status { .. } => services::status::run(ctx).await,
        Command::Put { kind, id, file } => services::objects::put(ctx, &kind, &id, &file).await,
        Command::Delete { kind, id } => services::objects::delete(ctx, &kind, &id).await,
    }
}
