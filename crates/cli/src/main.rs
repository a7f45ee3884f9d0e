//! Docsync command line.
//!
//! Objects live in a directory tree (`{root}/{kind}/{id}.{ext}`); the search
//! engine is an in-process index persisted to a JSON snapshot between runs.
//!
//! ## Commands
//!
//! - `reindex [KIND...]` - rebuild indices behind their aliases (all kinds by default)
//! - `reconcile KIND` - drop search documents whose object is gone
//! - `status` - aliases, generations and object counts per collection
//! - `put KIND ID --file PATH` - store an object and index it
//! - `delete KIND ID` - delete an object and its document

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod command;

use command::{CommandContext, CommandOutcome};

#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(about = "Keep a search index consistent with an object store")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, value_name = "PATH", default_value = "docsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild collection indices and swap their aliases
    Reindex {
        /// Collections to rebuild (every configured one when omitted)
        kinds: Vec<String>,

        /// Jobs running at once (defaults to reindex.workers)
        #[arg(long)]
        workers: Option<usize>,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete search documents whose object no longer exists
    Reconcile {
        kind: String,

        #[arg(long)]
        json: bool,
    },
    /// Show aliases, generations and counts per collection
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Store an object and queue its search document
    Put {
        kind: String,
        id: String,

        /// File holding the object body
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Delete an object and its search document
    Delete { kind: String, id: String },
}

impl Command {
    fn json(&self) -> bool {
        match self {
            Self::Reindex { json, .. } | Self::Reconcile { json, .. } | Self::Status { json } => {
                *json
            }
            Self::Put { .. } | Self::Delete { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.command.json();

    let ctx = CommandContext::load(&cli.config).await?;
    let outcome = command::execute(&ctx, cli.command).await?;
    ctx.persist().await?;

    print_outcome(&outcome, json)?;
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome(outcome: &CommandOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.data)?);
    } else {
        for line in &outcome.lines {
            println!("{line}");
        }
    }
    Ok(())
}
