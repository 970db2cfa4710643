use std::path::PathBuf;

use clap::Parser;
use rnnoie_trainer::{DEFAULT_SAVETO, TrainArgs, init_logging, run_training};

/// Train a supervised OIE tagger.
#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train an RNN OIE model on CoNLL corpora")]
#[command(version)]
struct Cli {
    /// Training corpus (CoNLL)
    #[arg(long)]
    train: PathBuf,

    /// Dev corpus used for checkpoint selection
    #[arg(long)]
    dev: PathBuf,

    /// Test corpus scored after training
    #[arg(long)]
    test: PathBuf,

    /// JSON file of the form {"hyperparams": {...}}
    #[arg(long = "load_hyperparams", visible_alias = "hyperparams")]
    load_hyperparams: PathBuf,

    /// Output model directory
    #[arg(long, default_value = DEFAULT_SAVETO)]
    saveto: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let args = TrainArgs {
        train: cli.train,
        dev: cli.dev,
        test: cli.test,
        hyperparams: cli.load_hyperparams,
        saveto: cli.saveto,
    };
    if let Err(e) = run_training(&args) {
        eprintln!("Training failed: {:#}", e);
        std::process::exit(1);
    }
}
