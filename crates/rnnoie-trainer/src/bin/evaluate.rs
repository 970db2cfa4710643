use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rnnoie_core::io::read_conll;
use rnnoie_trainer::{evaluate_saved, init_logging};

/// Score a saved model on a labeled CoNLL corpus.
#[derive(Parser)]
#[command(name = "evaluate")]
#[command(about = "Print span precision, recall and F1 of a saved model as JSON")]
#[command(version)]
struct Cli {
    /// Model directory written by `train`
    #[arg(long)]
    model: PathBuf,

    /// Labeled corpus (CoNLL)
    #[arg(long)]
    test: PathBuf,

    #[arg(long, default_value_t = 50)]
    batch_size: usize,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> Result<()> {
    let instances =
        read_conll(&cli.test).with_context(|| format!("failed to read {}", cli.test.display()))?;
    let report = evaluate_saved(&cli.model, instances, cli.batch_size)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Evaluation failed: {:#}", e);
        std::process::exit(1);
    }
}
