//! CoNLL reader and writer for supervised OIE corpora.
//!
//! One token per line, tab-separated:
//!
//! ```text
//! word_id  word  pred  pred_id  head_pred_id  sent_id  run_id  label
//! ```
//!
//! Each run holds the labels for one predicate of one sentence.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{OieError, Result};
use crate::tagging::{OieTag, Role};

/// Column names in the order they are written.
pub const COLUMNS: &[&str] = &[
    "word_id",
    "word",
    "pred",
    "pred_id",
    "head_pred_id",
    "sent_id",
    "run_id",
    "label",
];

/// A single labeled run: one sentence, one predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OieInstance {
    pub sent_id: usize,
    pub run_id: usize,
    pub words: Vec<String>,
    /// Index of the predicate head token.
    pub predicate_head: usize,
    pub labels: Vec<String>,
}

impl OieInstance {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Parse the label strings into tags.
    pub fn tags(&self) -> Result<Vec<OieTag>> {
        self.labels.iter().map(|l| l.parse()).collect()
    }

    /// Surface form of the predicate: words tagged with a predicate role,
    /// or the head word when no predicate label is present.
    pub fn predicate_text(&self) -> String {
        let words: Vec<&str> = self
            .words
            .iter()
            .zip(&self.labels)
            .filter(|(_, label)| {
                label
                    .parse::<OieTag>()
                    .is_ok_and(|t| t.role() == Some(Role::Predicate))
            })
            .map(|(w, _)| w.as_str())
            .collect();

        if words.is_empty() {
            self.words
                .get(self.predicate_head)
                .cloned()
                .unwrap_or_default()
        } else {
            words.join(" ")
        }
    }
}

/// Column positions resolved from a header (or the default order).
#[derive(Debug, Clone, Copy)]
struct Layout {
    word: usize,
    head_pred_id: usize,
    sent_id: usize,
    run_id: usize,
    label: usize,
    width: usize,
}

impl Layout {
    fn default_order() -> Self {
        Self {
            word: 1,
            head_pred_id: 4,
            sent_id: 5,
            run_id: 6,
            label: 7,
            width: COLUMNS.len(),
        }
    }

    fn from_header(columns: &[&str], line: usize) -> Result<Self> {
        let find = |name: &str| {
            columns
                .iter()
                .position(|c| *c == name)
                .ok_or_else(|| OieError::MalformedConll {
                    line,
                    reason: format!("header is missing column {name:?}"),
                })
        };

        let layout = Self {
            word: find("word")?,
            head_pred_id: find("head_pred_id")?,
            sent_id: find("sent_id")?,
            run_id: find("run_id")?,
            label: find("label")?,
            width: 0,
        };
        let width = [
            layout.word,
            layout.head_pred_id,
            layout.sent_id,
            layout.run_id,
            layout.label,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1;

        Ok(Self { width, ..layout })
    }
}

fn split_columns(line: &str) -> Vec<&str> {
    if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    }
}

fn parse_index(value: &str, column: &str, line: usize) -> Result<usize> {
    value.parse().map_err(|_| OieError::MalformedConll {
        line,
        reason: format!("column {column:?} is not an index: {value:?}"),
    })
}

/// Builder for the run currently being read.
#[derive(Default)]
struct PendingRun {
    key: Option<(usize, usize)>,
    head: usize,
    head_line: usize,
    words: Vec<String>,
    labels: Vec<String>,
}

impl PendingRun {
    fn finish(&mut self, out: &mut Vec<OieInstance>) -> Result<()> {
        let Some((sent_id, run_id)) = self.key.take() else {
            return Ok(());
        };
        let words = std::mem::take(&mut self.words);
        let labels = std::mem::take(&mut self.labels);

        if self.head >= words.len() {
            return Err(OieError::MalformedConll {
                line: self.head_line,
                reason: format!(
                    "predicate head {} is outside a run of {} tokens",
                    self.head,
                    words.len()
                ),
            });
        }

        out.push(OieInstance {
            sent_id,
            run_id,
            words,
            predicate_head: self.head,
            labels,
        });
        Ok(())
    }
}

/// Parse CoNLL rows from a reader.
pub fn parse_conll<R: BufRead>(reader: R) -> Result<Vec<OieInstance>> {
    let mut instances = Vec::new();
    let mut layout: Option<Layout> = None;
    let mut pending = PendingRun::default();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            pending.finish(&mut instances)?;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let columns = split_columns(line);

        let layout = match layout {
            Some(l) => l,
            None => {
                let resolved = if columns.contains(&"word") && columns.contains(&"label") {
                    let l = Layout::from_header(&columns, line_no)?;
                    layout = Some(l);
                    continue;
                } else {
                    Layout::default_order()
                };
                layout = Some(resolved);
                resolved
            }
        };

        if columns.len() < layout.width {
            return Err(OieError::MalformedConll {
                line: line_no,
                reason: format!(
                    "expected at least {} columns, found {}",
                    layout.width,
                    columns.len()
                ),
            });
        }

        let sent_id = parse_index(columns[layout.sent_id], "sent_id", line_no)?;
        let run_id = parse_index(columns[layout.run_id], "run_id", line_no)?;
        let head = parse_index(columns[layout.head_pred_id], "head_pred_id", line_no)?;

        if pending.key != Some((sent_id, run_id)) {
            pending.finish(&mut instances)?;
            pending.key = Some((sent_id, run_id));
            pending.head = head;
            pending.head_line = line_no;
        }

        pending.words.push(columns[layout.word].to_string());
        pending.labels.push(columns[layout.label].to_string());
    }

    pending.finish(&mut instances)?;
    Ok(instances)
}

/// Load a CoNLL file from disk.
pub fn read_conll<P: AsRef<Path>>(path: P) -> Result<Vec<OieInstance>> {
    let file = File::open(path)?;
    parse_conll(BufReader::new(file))
}

/// Write instances in CoNLL format, with header, one blank line between runs.
pub fn write_conll<W: Write>(writer: W, instances: &[OieInstance]) -> Result<()> {
    let mut out = BufWriter::new(writer);
    writeln!(out, "{}", COLUMNS.join("\t"))?;

    for instance in instances {
        let pred = instance.predicate_text();
        for (word_id, (word, label)) in instance.words.iter().zip(&instance.labels).enumerate() {
            writeln!(
                out,
                "{word_id}\t{word}\t{pred}\t{head}\t{head}\t{sent}\t{run}\t{label}",
                head = instance.predicate_head,
                sent = instance.sent_id,
                run = instance.run_id,
            )?;
        }
        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "word_id\tword\tpred\tpred_id\thead_pred_id\tsent_id\trun_id\tlabel
0\tJohn\tfounded\t1\t1\t0\t0\tA0-B
1\tfounded\tfounded\t1\t1\t0\t0\tP-B
2\tAcme\tfounded\t1\t1\t0\t0\tA1-B
0\tJohn\tlives\t4\t4\t0\t1\tA0-B
1\tfounded\tlives\t4\t4\t0\t1\tO
2\tAcme\tlives\t4\t4\t0\t1\tO
";

    #[test]
    fn test_head_out_of_range() {
        let err = parse_conll(SAMPLE.as_bytes()).unwrap_err();
        // Second run points its head past the end of a 3-token sentence.
        assert!(matches!(err, OieError::MalformedConll { line: 5, .. }));
    }

    #[test]
    fn test_parse_with_header() {
        let fixed = SAMPLE.replace("\t4\t4\t", "\t0\t0\t");
        let instances = parse_conll(fixed.as_bytes()).unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].words, vec!["John", "founded", "Acme"]);
        assert_eq!(instances[0].labels, vec!["A0-B", "P-B", "A1-B"]);
        assert_eq!(instances[0].predicate_head, 1);
        assert_eq!(instances[1].run_id, 1);
        assert_eq!(instances[1].predicate_head, 0);
    }

    #[test]
    fn test_parse_without_header_and_comments() {
        let text = "# comment\n0 Rain rain 0 0 3 9 P-B\n1 fell rain 0 0 3 9 O\n\n0 Sun shone 1 1 4 0 A0-B\n1 shone shone 1 1 4 0 P-B\n";
        let instances = parse_conll(text.as_bytes()).unwrap();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].sent_id, 3);
        assert_eq!(instances[0].run_id, 9);
        assert_eq!(instances[1].predicate_text(), "shone");
    }

    #[test]
    fn test_header_with_extra_columns() {
        let text = "label\tword\textra\thead_pred_id\tsent_id\trun_id\nP-B\truns\tx\t0\t0\t0\n";
        let instances = parse_conll(text.as_bytes()).unwrap();
        assert_eq!(instances[0].words, vec!["runs"]);
        assert_eq!(instances[0].labels, vec!["P-B"]);
    }

    #[test]
    fn test_short_row_is_rejected() {
        let text = "0\tJohn\tfounded\t1\n";
        let err = parse_conll(text.as_bytes()).unwrap_err();
        assert!(matches!(err, OieError::MalformedConll { line: 1, .. }));
    }

    #[test]
    fn test_non_numeric_id_is_rejected() {
        let text = "0\tJohn\tfounded\t1\tone\t0\t0\tA0-B\n";
        let err = parse_conll(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("head_pred_id"));
    }

    #[test]
    fn test_write_then_read() {
        let instances = vec![
            OieInstance {
                sent_id: 0,
                run_id: 0,
                words: vec!["Acme".into(), "was".into(), "acquired".into()],
                predicate_head: 2,
                labels: vec!["A1-B".into(), "P-B".into(), "P-I".into()],
            },
            OieInstance {
                sent_id: 1,
                run_id: 0,
                words: vec!["It".into(), "rained".into()],
                predicate_head: 1,
                labels: vec!["O".into(), "P-B".into()],
            },
        ];

        let mut buf = Vec::new();
        write_conll(&mut buf, &instances).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("word_id\tword\tpred"));
        assert!(text.contains("was acquired"));

        let back = parse_conll(text.as_bytes()).unwrap();
        assert_eq!(back, instances);
    }

    #[test]
    fn test_read_conll_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.conll");
        std::fs::write(&path, "0\tRain\train\t0\t0\t0\t0\tP-B\n").unwrap();

        let instances = read_conll(&path).unwrap();
        assert_eq!(instances.len(), 1);
        assert!(read_conll(dir.path().join("missing.conll")).is_err());
    }
}
