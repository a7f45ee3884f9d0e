use crate::command::{CommandContext, CommandOutcome};
use anyhow::Result;
use docsync_search::{SearchBackend, SearchQuery};
use docsync_store::ObjectStore;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CollectionStatus {
    kind: String,
    alias: String,
    bound: Vec<String>,
    generations: Vec<String>,
    objects: usize,
    documents: u64,
}

pub async fn run(ctx: &CommandContext) -> Result<CommandOutcome> {
    let mut statuses = Vec::new();
    for kind in ctx.registry.kinds() {
        let Some(registration) = ctx.registry.get(&kind) else {
            continue;
        };
        let alias = registration.alias();
        let bound: Vec<String> = ctx.search.alias_targets(&alias).await?.into_iter().collect();
        let generations = ctx
            .search
            .list_indices(&registration.identity.generation_prefix())
            .await?;
        let documents = if bound.is_empty() {
            0
        } else {
            ctx.search.query(&alias, &SearchQuery::match_all(0)).await?.total
        };
        let objects = ctx.store.list(&kind).await?.len();
        statuses.push(CollectionStatus {
            kind: kind.as_str().to_string(),
            alias,
            bound,
            generations,
            objects,
            documents,
        });
    }

    let mut outcome = CommandOutcome::from_value(&statuses, true)?;
    if statuses.is_empty() {
        outcome = outcome.line("No collections configured");
    }
    for status in &statuses {
        let bound = if status.bound.is_empty() {
            "unbound".to_string()
        } else {
            status.bound.join(", ")
        };
        outcome = outcome.line(format!(
            "{} ({}): {} objects, {} documents, alias -> {bound}, {} generation(s)",
            status.kind,
            status.alias,
            status.objects,
            status.documents,
            status.generations.len()
        ));
    }
    Ok(outcome)
}
