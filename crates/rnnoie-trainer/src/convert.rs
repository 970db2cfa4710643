//! Conversion of extraction tables into labeled CoNLL runs.
//!
//! Each input row holds a sentence, its base and surface predicate and up
//! to ten arguments. Rows are aligned to the tokenized sentence by exact
//! (case-insensitive) token matches.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use rnnoie_core::io::{Hyperparams, OieInstance};
use rnnoie_core::tagging::{MAX_ARGUMENTS, OieTag, Role, Tokenizer, normalize};
use tracing::{debug, info, warn};

/// One row of an extraction table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub sentence: String,
    pub base_predicate: String,
    pub surface_predicate: String,
    /// Argument texts by index; empty cells are `None`.
    pub arguments: Vec<Option<String>>,
}

impl TableRow {
    /// Split a line on `sep`. Lines with fewer than three fields yield `None`.
    pub fn parse(line: &str, sep: &str) -> Option<Self> {
        let mut fields = line.split(sep).map(str::trim);
        let sentence = fields.next().filter(|s| !s.is_empty())?.to_string();
        let base_predicate = fields.next()?.to_string();
        let surface_predicate = fields.next()?.to_string();
        let arguments = fields
            .take(usize::from(MAX_ARGUMENTS))
            .map(|f| (!f.is_empty()).then(|| f.to_string()))
            .collect();

        Some(Self {
            sentence,
            base_predicate,
            surface_predicate,
            arguments,
        })
    }

    /// Text used to locate the predicate: the surface form when present.
    pub fn predicate(&self) -> &str {
        if self.surface_predicate.is_empty() {
            &self.base_predicate
        } else {
            &self.surface_predicate
        }
    }
}

/// Field delimiter for a table: an explicit `sep` wins, then the `sep` of a
/// hyperparameter file, then the default tab.
pub fn resolve_sep(sep: Option<&str>, hyperparams: Option<&Path>) -> Result<String> {
    if let Some(sep) = sep {
        return Ok(sep.to_string());
    }
    match hyperparams {
        Some(path) => Ok(Hyperparams::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?
            .sep),
        None => Ok(Hyperparams::default().sep),
    }
}

pub fn read_table<P: AsRef<Path>>(path: P, sep: &str) -> Result<Vec<TableRow>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match TableRow::parse(&line, sep) {
            Some(row) => rows.push(row),
            None => warn!("Skipping malformed row at line {}", number + 1),
        }
    }
    Ok(rows)
}

/// Find the first window of `words` equal to `needle` (case-insensitive)
/// whose positions are all still unlabeled.
fn find_free(words: &[String], needle: &[String], taken: &[bool]) -> Option<usize> {
    if needle.is_empty() || needle.len() > words.len() {
        return None;
    }
    (0..=words.len() - needle.len()).find(|&start| {
        needle
            .iter()
            .enumerate()
            .all(|(k, w)| !taken[start + k] && normalize(&words[start + k]) == *w)
    })
}

fn label_span(labels: &mut [OieTag], taken: &mut [bool], role: Role, start: usize, len: usize) {
    for pos in start..start + len {
        labels[pos] = if pos == start {
            OieTag::Begin(role)
        } else {
            OieTag::Inside(role)
        };
        taken[pos] = true;
    }
}

/// Align one row to its sentence.
///
/// The predicate is placed first and its last token becomes the head.
/// Arguments that cannot be found are left unlabeled. Returns `None` when
/// the predicate itself cannot be aligned.
pub fn align(tokenizer: &Tokenizer, row: &TableRow) -> Option<(Vec<String>, Vec<OieTag>, usize)> {
    let words = tokenizer.words(&row.sentence);
    let pieces = |text: &str| -> Vec<String> {
        tokenizer.words(text).iter().map(|w| normalize(w)).collect()
    };

    let mut labels = vec![OieTag::Outside; words.len()];
    let mut taken = vec![false; words.len()];

    let predicate = pieces(row.predicate());
    let start = find_free(&words, &predicate, &taken)?;
    label_span(&mut labels, &mut taken, Role::Predicate, start, predicate.len());
    let head = start + predicate.len() - 1;

    for (index, argument) in row.arguments.iter().enumerate() {
        let Some(text) = argument else { continue };
        let needle = pieces(text);
        match find_free(&words, &needle, &taken) {
            Some(start) => label_span(
                &mut labels,
                &mut taken,
                Role::Argument(index as u8),
                start,
                needle.len(),
            ),
            None => debug!("Argument {:?} not found in {:?}", text, row.sentence),
        }
    }

    Some((words, labels, head))
}

/// Convert rows into CoNLL runs. Rows of the same sentence share a
/// sentence id; run ids are unique across the output.
pub fn convert(tokenizer: &Tokenizer, rows: &[TableRow]) -> Vec<OieInstance> {
    let mut sentence_ids: HashMap<&str, usize> = HashMap::new();
    let mut instances = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;

    for row in rows {
        let Some((words, labels, head)) = align(tokenizer, row) else {
            debug!("Predicate {:?} not found in {:?}", row.predicate(), row.sentence);
            skipped += 1;
            continue;
        };

        let next_id = sentence_ids.len();
        let sent_id = *sentence_ids.entry(row.sentence.as_str()).or_insert(next_id);
        instances.push(OieInstance {
            sent_id,
            run_id: instances.len(),
            words,
            predicate_head: head,
            labels: labels.iter().map(ToString::to_string).collect(),
        });
    }

    if skipped > 0 {
        warn!("Skipped {} rows whose predicate could not be aligned", skipped);
    }
    info!(
        "Converted {} rows into {} runs over {} sentences",
        rows.len(),
        instances.len(),
        sentence_ids.len()
    );
    instances
}
