//! Data loading for CoNLL-formatted OIE corpora.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use rnnoie_core::io::{OieInstance, Vocabulary, read_conll};
use rnnoie_core::model::BatchItem;
use rnnoie_core::tagging::{OieTag, TagSet};
use tracing::{debug, info, warn};

/// Train, dev and test runs sharing one tag set.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Vec<OieInstance>,
    pub dev: Vec<OieInstance>,
    pub test: Vec<OieInstance>,
    pub tags: TagSet,
}

impl Dataset {
    pub fn load(train: &Path, dev: &Path, test: &Path) -> Result<Self> {
        let read = |split: &str, path: &Path| {
            read_conll(path).with_context(|| format!("failed to read {split} set {}", path.display()))
        };
        Self::from_splits(read("train", train)?, read("dev", dev)?, read("test", test)?)
    }

    /// Build the tag set from the training labels and map dev/test labels
    /// it does not cover to `O`.
    pub fn from_splits(
        train: Vec<OieInstance>,
        mut dev: Vec<OieInstance>,
        mut test: Vec<OieInstance>,
    ) -> Result<Self> {
        if train.is_empty() {
            bail!("training set is empty");
        }

        let mut observed = BTreeSet::new();
        for instance in &train {
            let tags = instance.tags().with_context(|| {
                format!(
                    "invalid label in training sentence {} run {}",
                    instance.sent_id, instance.run_id
                )
            })?;
            observed.extend(tags);
        }
        let tags = TagSet::from_tags(observed);

        for (split, instances) in [("dev", &mut dev), ("test", &mut test)] {
            let replaced = map_unknown_labels(instances, &tags);
            if replaced > 0 {
                warn!("{} {} labels are unknown to the training set, using O", replaced, split);
            }
        }

        info!(
            "Loaded {} train, {} dev, {} test runs with {} tags",
            train.len(),
            dev.len(),
            test.len(),
            tags.len()
        );

        Ok(Self {
            train,
            dev,
            test,
            tags,
        })
    }
}

/// Replace labels outside `tags` with `O`. Returns how many were replaced.
pub fn map_unknown_labels(instances: &mut [OieInstance], tags: &TagSet) -> usize {
    let mut replaced = 0;
    for label in instances.iter_mut().flat_map(|i| i.labels.iter_mut()) {
        let known = label.parse::<OieTag>().is_ok_and(|t| tags.contains(t));
        if !known {
            *label = OieTag::Outside.to_string();
            replaced += 1;
        }
    }
    replaced
}

/// Predicate heads of all runs, grouped by sentence id.
pub fn sentence_heads(instances: &[OieInstance]) -> BTreeMap<usize, BTreeSet<usize>> {
    let mut heads: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for instance in instances {
        heads
            .entry(instance.sent_id)
            .or_default()
            .insert(instance.predicate_head);
    }
    heads
}

/// Maps runs to index form for the network.
pub struct Encoder<'a> {
    vocab: &'a Vocabulary,
    tags: &'a TagSet,
}

impl<'a> Encoder<'a> {
    pub fn new(vocab: &'a Vocabulary, tags: &'a TagSet) -> Self {
        Self { vocab, tags }
    }

    /// Encode one run with gold tags and predicate-head targets.
    ///
    /// With `max_len` the run is truncated; `None` is returned when the
    /// predicate head falls past the cut.
    pub fn encode(
        &self,
        instance: &OieInstance,
        heads: &BTreeSet<usize>,
        max_len: Option<usize>,
    ) -> Result<Option<BatchItem>> {
        let len = max_len.map_or(instance.len(), |m| m.min(instance.len()));
        if instance.predicate_head >= len {
            return Ok(None);
        }

        let word_ids = instance.words[..len]
            .iter()
            .map(|w| self.vocab.index(w) as u32)
            .collect();
        let tag_ids = instance
            .tags()?
            .into_iter()
            .take(len)
            .map(|tag| {
                self.tags
                    .index(tag)
                    .map(|i| i as u32)
                    .with_context(|| format!("tag {tag} is not in the tag set"))
            })
            .collect::<Result<Vec<_>>>()?;
        let predicate_heads = (0..len).map(|i| heads.contains(&i)).collect();

        Ok(Some(BatchItem {
            tag_ids: Some(tag_ids),
            predicate_heads: Some(predicate_heads),
            ..BatchItem::new(word_ids, instance.predicate_head)
        }))
    }

    /// Encode a whole split. Runs lost to truncation are skipped.
    pub fn encode_split(
        &self,
        instances: &[OieInstance],
        max_len: Option<usize>,
    ) -> Result<Vec<BatchItem>> {
        let heads = sentence_heads(instances);
        let empty = BTreeSet::new();

        let mut items = Vec::with_capacity(instances.len());
        for instance in instances {
            let sentence_heads = heads.get(&instance.sent_id).unwrap_or(&empty);
            match self.encode(instance, sentence_heads, max_len)? {
                Some(item) => items.push(item),
                None => debug!(
                    "Skipping sentence {} run {}: predicate head beyond {} tokens",
                    instance.sent_id,
                    instance.run_id,
                    max_len.unwrap_or(instance.len())
                ),
            }
        }

        let skipped = instances.len() - items.len();
        if skipped > 0 {
            warn!("Skipped {} runs whose predicate head was truncated away", skipped);
        }
        Ok(items)
    }
}

/// A permutation of `0..len`, reproducible for a given seed.
pub fn shuffled_indices(len: usize, seed: u64) -> Vec<usize> {
    let mut rng = oorandom::Rand64::new(u128::from(seed));
    let mut indices: Vec<usize> = (0..len).collect();
    for i in (1..len).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        indices.swap(i, j);
    }
    indices
}
