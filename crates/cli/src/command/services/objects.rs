use crate::command::{CommandContext, CommandOutcome};
use anyhow::{Context as AnyhowContext, Result};
use docsync_indexer::{AsyncWriter, ShutdownReport, SyncedCollection};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ObjectChange {
    key: String,
    alias: String,
    existed: Option<bool>,
    search: ShutdownReport,
}

pub async fn put(ctx: &CommandContext, kind: &str, id: &str, file: &Path) -> Result<CommandOutcome> {
    let registration = ctx.registration(kind)?;
    let key = registration.key_convention.key_for(&registration.kind, id)?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let writer = AsyncWriter::start(ctx.search.clone(), ctx.config.writer.to_writer_config());
    let synced = SyncedCollection::new(registration.clone(), ctx.store.clone(), writer.clone());
    let saved = synced.save_bytes(&key, &bytes).await;
    let search = writer.close().await;
    saved.with_context(|| format!("Failed to save {key}"))?;

    let last_error = writer.health_snapshot().last_error;
    finish(key.path(), registration.alias(), None, search, last_error)
}

pub async fn delete(ctx: &CommandContext, kind: &str, id: &str) -> Result<CommandOutcome> {
    let registration = ctx.registration(kind)?;
    let key = registration.key_convention.key_for(&registration.kind, id)?;

    let writer = AsyncWriter::start(ctx.search.clone(), ctx.config.writer.to_writer_config());
    let synced = SyncedCollection::new(registration.clone(), ctx.store.clone(), writer.clone());
    let removed = synced.remove(&key).await;
    let search = writer.close().await;
    let existed = removed.with_context(|| format!("Failed to delete {key}"))?;

    let last_error = writer.health_snapshot().last_error;
    finish(key.path(), registration.alias(), Some(existed), search, last_error)
}

fn finish(
    key: String,
    alias: String,
    existed: Option<bool>,
    search: ShutdownReport,
    last_error: Option<String>,
) -> Result<CommandOutcome> {
    let mut lines = vec![match existed {
        None => format!("Stored {key}"),
        Some(true) => format!("Deleted {key}"),
        Some(false) => format!("{key} was not in the store"),
    }];
    if search.failed > 0 {
        let reason = last_error.unwrap_or_else(|| "search write failed".to_string());
        lines.push(format!(
            "Search index {alias} not updated ({reason}); run `docsync reindex`"
        ));
    }

    let change = ObjectChange {
        key,
        alias,
        existed,
        search,
    };
    let mut outcome = CommandOutcome::from_value(&change, true)?;
    outcome.lines = lines;
    Ok(outcome)
}
