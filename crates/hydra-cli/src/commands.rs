use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use futures::StreamExt;
use hydra_sdk::{
    ChunkReader, HydraConfig, HydratedDocument, PlaceholderGrammar, StreamSummary, UpdateEvent,
};
use serde_json::Value;
use tokio::io::{AsyncBufRead, BufReader};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Scan(args) => cmd_scan(args, &config, &cli.format),
        Command::Hydrate(args) => cmd_hydrate(args, &config, &cli.format).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HydraConfig> {
    match path {
        Some(path) => HydraConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(HydraConfig::default()),
    }
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn cmd_scan(args: ScanArgs, config: &HydraConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let document = read_document(&args.document)?;
    let grammar = PlaceholderGrammar::new(&config.resolver.placeholder_pattern)?;
    let ids = grammar.find_all_ids(&document);

    match format {
        OutputFormat::Json => {
            let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
            println!("{}", serde_json::to_string(&ids)?);
        }
        OutputFormat::Text => {
            if ids.is_empty() {
                println!("No placeholders.");
            }
            for id in &ids {
                println!("  {} {}", "chunk".cyan(), id.as_str().yellow());
            }
        }
    }
    Ok(())
}

async fn cmd_hydrate(
    args: HydrateArgs,
    config: &HydraConfig,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let document = HydratedDocument::with_config(read_document(&args.document)?, config)?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.chunks {
        Some(path) => Box::new(BufReader::new(open_chunks(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let summary = hydrate(&document, reader).await?;

    let resolved = if args.wait {
        document.try_resolved()?
    } else {
        document.resolved()
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&resolved)?),
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(&resolved)?);
            print_summary(&document, &summary);
        }
    }
    Ok(())
}

async fn open_chunks(path: &Path) -> anyhow::Result<tokio::fs::File> {
    tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Feed every line of `reader` through the document, reporting failed
/// batches on stderr as they happen.
async fn hydrate<R>(document: &HydratedDocument, reader: R) -> anyhow::Result<StreamSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut updates = document.updates();
    let reporter = tokio::spawn(async move {
        while let Some(event) = updates.next().await {
            if let UpdateEvent::Error(error) = event {
                eprintln!("{} {}", "error:".red().bold(), error);
            }
        }
    });

    let summary = document.process_lines(reader).await;
    document.close();
    reporter.await?;
    Ok(summary?)
}

fn print_summary(document: &HydratedDocument, summary: &StreamSummary) {
    let pending = document.pending_ids();
    let status = if pending.is_empty() {
        "✓ fully hydrated".green().bold()
    } else {
        format!("{} placeholder(s) pending", pending.len()).yellow().bold()
    };
    eprintln!(
        "{} ({} batches, {} failures, {} chunks known)",
        status,
        summary.batches,
        summary.failures,
        document.ledger().states().len()
    );
    for id in pending {
        eprintln!("  {} {} ({})", "pending:".yellow(), id, document.ledger().state(&id));
    }
}
