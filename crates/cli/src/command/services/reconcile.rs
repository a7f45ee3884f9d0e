use crate::command::{CommandContext, CommandOutcome};
use anyhow::{Context as AnyhowContext, Result};
use docsync_indexer::Reconciler;

pub async fn run(ctx: &CommandContext, kind: &str) -> Result<CommandOutcome> {
    let registration = ctx.registration(kind)?;
    let report = Reconciler::new(ctx.store.clone(), ctx.search.clone())
        .with_page_size(ctx.config.reindex.reconcile_page_size)
        .reconcile(&registration)
        .await
        .with_context(|| format!("Reconcile of {} failed", registration.alias()))?;

    let line = format!(
        "{}: examined {}, deleted {}, failures {}",
        registration.alias(),
        report.examined,
        report.deleted,
        report.failures
    );
    Ok(CommandOutcome::from_value(&report, report.failures == 0)?.line(line))
}
