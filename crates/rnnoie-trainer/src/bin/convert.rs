use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rnnoie_core::io::write_conll;
use rnnoie_core::tagging::Tokenizer;
use rnnoie_trainer::convert::{convert, read_table, resolve_sep};
use rnnoie_trainer::init_logging;
use tracing::info;

/// Convert an extraction table into a CoNLL training corpus.
#[derive(Parser)]
#[command(name = "convert")]
#[command(about = "Align sentence/predicate/argument rows into labeled CoNLL runs")]
#[command(version)]
struct Cli {
    /// Extraction table: sentence, base predicate, surface predicate, arg0..arg9
    #[arg(long = "in")]
    input: PathBuf,

    /// Output CoNLL file
    #[arg(long = "out")]
    output: PathBuf,

    /// Field delimiter of the input table (default: the hyperparameter
    /// file's `sep`, else tab)
    #[arg(long)]
    sep: Option<String>,

    /// Hyperparameter file to take the delimiter from
    #[arg(long = "load_hyperparams", visible_alias = "hyperparams")]
    load_hyperparams: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> Result<()> {
    if !cli.input.exists() {
        bail!("Input not found: {}", cli.input.display());
    }

    let sep = resolve_sep(cli.sep.as_deref(), cli.load_hyperparams.as_deref())?;
    let rows = read_table(&cli.input, &sep)?;
    let instances = convert(&Tokenizer::new()?, &rows);

    let file = File::create(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    write_conll(file, &instances)?;
    info!("Wrote {} runs to {}", instances.len(), cli.output.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Conversion failed: {:#}", e);
        std::process::exit(1);
    }
}
