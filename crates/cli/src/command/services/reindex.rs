use crate::command::{CommandContext, CommandOutcome};
use anyhow::Result;
use docsync_indexer::SyncCoordinator;
use docsync_store::CollectionKind;

pub async fn run(
    ctx: &CommandContext,
    kinds: &[String],
    workers: Option<usize>,
) -> Result<CommandOutcome> {
    let kinds: Vec<CollectionKind> = if kinds.is_empty() {
        ctx.registry.kinds()
    } else {
        kinds
            .iter()
            .map(|kind| CollectionKind::new(kind.as_str()))
            .collect::<std::result::Result<_, _>>()?
    };
    let workers = workers.unwrap_or(ctx.config.reindex.workers);

    let coordinator = SyncCoordinator::new(ctx.registry.clone(), ctx.store.clone(), ctx.search.clone())
        .with_reindex_config(ctx.config.reindex.to_reindex_config())
        .with_batch_timeout(ctx.config.reindex.batch_timeout())
        .with_stop_grace(ctx.config.reindex.stop_grace());
    let report = coordinator.run_all(&kinds, workers).await;

    let mut outcome = CommandOutcome::from_value(&report, report.succeeded())?;
    for job in &report.jobs {
        let line = if job.succeeded() {
            format!(
                "{}: {} -> {} ({} documents, {} skipped, {}ms)",
                job.kind,
                job.alias,
                job.generation.as_deref().unwrap_or_default(),
                job.documents_indexed,
                job.skipped,
                job.duration_ms
            )
        } else {
            match &job.error {
                Some(error) => format!("{}: {:?} - {error}", job.kind, job.state),
                None => format!("{}: {:?}", job.kind, job.state),
            }
        };
        outcome = outcome.line(line);
        if let Some(orphan) = &job.orphaned_generation {
            outcome = outcome.line(format!("  orphaned generation {orphan} needs manual deletion"));
        }
    }
    for kind in &report.unfinished {
        outcome = outcome.line(format!("{kind}: did not finish before the batch timeout"));
    }
    for orphan in &report.orphaned_generations {
        outcome = outcome.line(format!("orphaned generation {orphan} needs manual deletion"));
    }
    if report.jobs.is_empty() && report.unfinished.is_empty() {
        outcome = outcome.line("No collections to reindex");
    }
    Ok(outcome)
}
