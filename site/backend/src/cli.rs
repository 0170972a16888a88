use clap::{Parser, Subcommand};
use concept_resolver::{ResolverArgs, constants::DEFAULT_BROWSER_EDITION};

#[derive(Parser, Debug)]
#[command(name = "site-backend")]
#[command(about = "Diagnosis to SNOMED CT lookup service", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Resolve one diagnostic term and print the JSON response.
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,

    /// Edition used in SNOMED CT browser links.
    #[arg(long, default_value = DEFAULT_BROWSER_EDITION)]
    pub browser_edition: String,

    #[command(flatten)]
    pub resolver: ResolverArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Free-text diagnosis, e.g. "diabetes mellitus and hypertension".
    #[arg(long)]
    pub term: String,

    #[arg(long, default_value = "diagnosis")]
    pub diagnosis_type: String,

    /// Edition used in SNOMED CT browser links.
    #[arg(long, default_value = DEFAULT_BROWSER_EDITION)]
    pub browser_edition: String,

    #[command(flatten)]
    pub resolver: ResolverArgs,
}
