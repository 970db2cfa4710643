//! Run a trained rnnoie model over raw sentences, one per line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rnnoie_core::{Extraction, Extractor, OieInstance, io::write_conll};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "oie-predict")]
#[command(about = "Extract relation tuples from sentences with a trained model")]
#[command(version)]
struct Cli {
    /// Model directory written by `train`
    #[arg(long)]
    model: PathBuf,

    /// Input file, one sentence per line (stdin when omitted)
    #[arg(long = "in")]
    input: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(long = "out")]
    output: Option<PathBuf>,

    /// Write CoNLL runs instead of tab-separated tuples
    #[arg(long, conflicts_with = "json")]
    conll: bool,

    /// Write one JSON object per sentence
    #[arg(long)]
    json: bool,

    /// Override the predicate-detection threshold stored with the model
    #[arg(long, value_parser = parse_threshold)]
    threshold: Option<f32>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct SentenceOutput<'a> {
    sentence: &'a str,
    extractions: Vec<Extraction>,
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Conll,
    Json,
}

/// Thresholds must lie strictly between 0 and 1.
fn parse_threshold(value: &str) -> std::result::Result<f32, String> {
    let threshold: f32 = value
        .parse()
        .map_err(|e| format!("invalid threshold {value:?}: {e}"))?;
    if threshold > 0.0 && threshold < 1.0 {
        Ok(threshold)
    } else {
        Err(format!("threshold must be in (0, 1), got {value}"))
    }
}

/// Counts reported after a prediction pass.
#[derive(Debug, Default, PartialEq, Eq)]
struct Totals {
    sentences: usize,
    tuples: usize,
    failed: usize,
}

/// Run `extract` over every non-blank line of `reader` and write the
/// results to `writer` in `format`. Failing sentences are logged and
/// skipped (reported in the `error` field for JSON).
fn predict_lines<R, W, F>(
    reader: R,
    mut writer: W,
    format: Format,
    mut extract: F,
) -> Result<Totals>
where
    R: BufRead,
    W: Write,
    F: FnMut(&str) -> rnnoie_core::Result<Vec<Extraction>>,
{
    let mut runs: Vec<OieInstance> = Vec::new();
    let mut totals = Totals::default();
    for line in reader.lines() {
        let line = line?;
        let sentence = line.trim();
        if sentence.is_empty() {
            continue;
        }

        let result = extract(sentence);
        if let Err(e) = &result {
            warn!("Skipping {:?}: {}", sentence, e);
            totals.failed += 1;
        }

        match format {
            Format::Json => {
                let output = match result {
                    Ok(extractions) => SentenceOutput {
                        sentence,
                        extractions,
                        error: None,
                    },
                    Err(e) => SentenceOutput {
                        sentence,
                        extractions: Vec::new(),
                        error: Some(e.to_string()),
                    },
                };
                totals.tuples += output.extractions.len();
                writeln!(writer, "{}", serde_json::to_string(&output)?)?;
            }
            Format::Text => {
                for extraction in result.unwrap_or_default() {
                    writeln!(writer, "{extraction}")?;
                    totals.tuples += 1;
                }
            }
            Format::Conll => {
                for extraction in result.unwrap_or_default() {
                    runs.push(extraction.to_instance(totals.sentences, runs.len()));
                    totals.tuples += 1;
                }
            }
        }
        totals.sentences += 1;
    }

    if format == Format::Conll {
        write_conll(&mut writer, &runs)?;
    }
    writer.flush()?;
    Ok(totals)
}

fn run(cli: Cli) -> Result<()> {
    let mut extractor = Extractor::load(&cli.model)
        .with_context(|| format!("failed to load model from {}", cli.model.display()))?;
    if let Some(threshold) = cli.threshold {
        extractor = extractor.with_threshold(threshold);
    }
    info!("Loaded model from {}", cli.model.display());

    let reader: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let format = if cli.conll {
        Format::Conll
    } else if cli.json {
        Format::Json
    } else {
        Format::Text
    };

    let totals = predict_lines(reader, writer, format, |s| extractor.extract(s))?;
    info!(
        "Extracted {} tuples from {} sentences ({} failed)",
        totals.tuples, totals.sentences, totals.failed
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Prediction failed: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};
    use rnnoie_core::io::embeddings::{PAD_TOKEN, UNK_TOKEN};
    use rnnoie_core::io::parse_conll;
    use rnnoie_core::{
        Hyperparams, ModelConfig, ModelDir, ModelMeta, OieError, OieModel, OieTag, TagSet,
        Vocabulary,
    };

    const INPUT: &str = "Cats sleep.\n\n   \nbroken line\nDogs bark.\n";

    fn tags(labels: &[&str]) -> Vec<OieTag> {
        labels.iter().map(|l| l.parse().unwrap()).collect()
    }

    /// Every sentence but "broken line" yields one tuple: first word as A0,
    /// second as predicate.
    fn fake_extract(sentence: &str) -> rnnoie_core::Result<Vec<Extraction>> {
        if sentence == "broken line" {
            return Err(OieError::ModelLoad("weights unavailable".into()));
        }
        let words: Vec<String> = sentence
            .trim_end_matches('.')
            .split(' ')
            .map(str::to_string)
            .collect();
        Ok(vec![Extraction::from_words(&words, &tags(&["A0-B", "P-B"]), 1, 0.25)])
    }

    fn render(format: Format) -> (String, Totals) {
        let mut out = Vec::new();
        let totals = predict_lines(INPUT.as_bytes(), &mut out, format, fake_extract).unwrap();
        (String::from_utf8(out).unwrap(), totals)
    }

    #[test]
    fn test_text_output_skips_blank_and_failed_lines() {
        let (text, totals) = render(Format::Text);

        assert_eq!(
            totals,
            Totals {
                sentences: 3,
                tuples: 2,
                failed: 1
            }
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["Cats sleep\t0.2500\tsleep\tCats", "Dogs bark\t0.2500\tbark\tDogs"]
        );
    }

    #[test]
    fn test_json_output_reports_errors() {
        let (text, _) = render(Format::Json);

        let objects: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0]["sentence"], "Cats sleep.");
        assert!(objects[0]["error"].is_null());
        assert_eq!(objects[0]["extractions"][0]["predicate"], "sleep");

        assert_eq!(objects[1]["sentence"], "broken line");
        assert!(objects[1]["error"].as_str().unwrap().contains("weights unavailable"));
        assert_eq!(objects[1]["extractions"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_conll_output_numbers_sentences() {
        let (text, _) = render(Format::Conll);

        let runs = parse_conll(text.as_bytes()).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].sent_id, 0);
        assert_eq!(runs[1].sent_id, 2);
        assert_eq!(runs[1].run_id, 1);
        assert_eq!(runs[1].words, vec!["Dogs", "bark"]);
        assert_eq!(runs[1].labels, vec!["A0-B", "P-B"]);
    }

    #[test]
    fn test_threshold_must_be_a_probability() {
        assert_eq!(parse_threshold("0.3"), Ok(0.3));
        for bad in ["0", "1", "-0.2", "1.5", "NaN", "high"] {
            assert!(parse_threshold(bad).is_err(), "accepted {bad}");
        }
    }

    fn save_untrained(dir: &std::path::Path) {
        let tags = TagSet::from_labels(&["P-B", "P-I", "A0-B", "A0-I", "A1-B", "A1-I"]).unwrap();
        let vocab = Vocabulary::from_words(
            [PAD_TOKEN, UNK_TOKEN, "cats", "sleep", "dogs", "bark", "."]
                .iter()
                .map(|w| w.to_string())
                .collect(),
        )
        .unwrap();
        let hyperparams = Hyperparams {
            hidden_units: 4,
            num_of_latent_layers: 1,
            pred_indicator_dim: 2,
            ..Default::default()
        };
        let config = ModelConfig::from_hyperparams(&hyperparams, vocab.len(), 3, tags.len());

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        OieModel::load(config, vb).unwrap();

        let model_dir = ModelDir::new(dir);
        model_dir
            .save_meta(&ModelMeta {
                config,
                hyperparams,
                tags,
                vocab,
            })
            .unwrap();
        varmap.save(model_dir.weights_path()).unwrap();
    }

    #[test]
    fn test_saved_model_emits_one_object_per_sentence() {
        let dir = tempfile::tempdir().unwrap();
        save_untrained(dir.path());
        let extractor = Extractor::load(dir.path()).unwrap().with_threshold(0.2);

        let mut out = Vec::new();
        let totals = predict_lines(
            "Cats sleep.\n\nDogs bark.\n".as_bytes(),
            &mut out,
            Format::Json,
            |s| extractor.extract(s),
        )
        .unwrap();

        assert_eq!(totals.sentences, 2);
        assert_eq!(totals.failed, 0);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            let object: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(object["error"].is_null());
        }
    }
}
