mod cli;
mod lookup;
mod server;

use anyhow::Context;
use clap::Parser;
use concept_resolver::build_engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Resolve(cmd) => resolve_once(cmd).await.context("resolve failed"),
    }
}

async fn resolve_once(cmd: cli::ResolveArgs) -> anyhow::Result<()> {
    let config = cmd.resolver.clone().into_config();
    let mut engine = build_engine(&config).context("build resolution engine")?;

    tracing::info!(diagnosis_type = %cmd.diagnosis_type, term = %cmd.term, "lookup");
    let response = lookup::lookup(&mut engine, cmd.term.trim(), &cmd.browser_edition).await;
    let json = serde_json::to_string_pretty(&response).context("serialize response")?;
    println!("{json}");
    Ok(())
}
