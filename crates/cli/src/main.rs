mod cli;
mod input;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use confmacro_core::config::{load_dotenv, ResolverConfig};
use confmacro_resolver::{MacroResolver, MemoryStore, ResolveOptions, Scenario};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    if args.list_scenarios {
        for scenario in Scenario::ALL {
            println!("{scenario}");
        }
        return Ok(());
    }

    let (Some(snapshot), Some(scenario)) = (args.snapshot.as_deref(), args.scenario.as_deref())
    else {
        bail!("--snapshot and --scenario are required");
    };

    load_dotenv();
    let config = ResolverConfig::from_env();
    config.log_summary();

    let store = MemoryStore::from_path(snapshot)
        .with_context(|| format!("failed to load snapshot {}", snapshot.display()))?;
    let inputs = input::read_inputs(&args.input)?;
    info!(scenario, entities = inputs.len(), "Resolving request");

    let resolver = MacroResolver::with_store(Arc::new(store), config);
    let options = ResolveOptions {
        references_only: args.references_only,
    };
    let output = resolver.resolve_named(scenario, inputs, options).await?;

    let json = if args.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{json}");
    Ok(())
}
