use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hydra",
    about = "Hydra: fill placeholders in JSON documents as chunks arrive",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every placeholder identifier in a document
    Scan(ScanArgs),
    /// Feed line-delimited chunk batches through a document
    Hydrate(HydrateArgs),
}

#[derive(Args)]
pub struct ScanArgs {
    /// JSON document to scan
    pub document: PathBuf,
}

#[derive(Args)]
pub struct HydrateArgs {
    /// JSON document to hydrate
    pub document: PathBuf,
    /// File of JSON batches, one per line (defaults to stdin)
    #[arg(long)]
    pub chunks: Option<PathBuf>,
    /// Fail if any placeholder is still unresolved once input ends
    #[arg(long)]
    pub wait: bool,
}
