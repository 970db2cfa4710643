//! # OIE Tag Scheme
//!
//! Defines the label set for sequence labeling of predicates and their
//! arguments. Labels use the `{role}-{B|I}` form (`P-B`, `A0-I`, ...) plus
//! `O` for tokens outside every span.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OieError, Result};

/// Maximum number of argument slots a tuple may carry (`A0`..`A9`).
pub const MAX_ARGUMENTS: u8 = 10;

/// The semantic role of a labeled span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Predicate,
    Argument(u8),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Predicate => write!(f, "P"),
            Role::Argument(i) => write!(f, "A{i}"),
        }
    }
}

impl FromStr for Role {
    type Err = OieError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "P" {
            return Ok(Role::Predicate);
        }
        s.strip_prefix('A')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|&n| n < MAX_ARGUMENTS)
            .map(Role::Argument)
            .ok_or_else(|| OieError::UnknownLabel(s.to_string()))
    }
}

/// A single token label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OieTag {
    // Order matters: `O` sorts first, Begin before Inside for each role.
    Outside,
    Begin(Role),
    Inside(Role),
}

impl OieTag {
    /// The role of the span this tag belongs to, if any.
    pub fn role(&self) -> Option<Role> {
        match self {
            OieTag::Begin(r) | OieTag::Inside(r) => Some(*r),
            OieTag::Outside => None,
        }
    }

    pub fn is_begin(&self) -> bool {
        matches!(self, OieTag::Begin(_))
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, OieTag::Inside(_))
    }

    pub fn is_predicate(&self) -> bool {
        self.role() == Some(Role::Predicate)
    }

    /// Check if transitioning from `from` tag to `to` tag is valid.
    ///
    /// An `Inside` tag must continue a span of the same role.
    pub fn is_valid_transition(from: OieTag, to: OieTag) -> bool {
        match to {
            OieTag::Inside(role) => from.role() == Some(role),
            _ => true,
        }
    }

    /// Whether a sequence may begin with this tag.
    pub fn can_start(tag: OieTag) -> bool {
        !tag.is_inside()
    }
}

impl fmt::Display for OieTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OieTag::Outside => write!(f, "O"),
            OieTag::Begin(r) => write!(f, "{r}-B"),
            OieTag::Inside(r) => write!(f, "{r}-I"),
        }
    }
}

impl FromStr for OieTag {
    type Err = OieError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "O" {
            return Ok(OieTag::Outside);
        }
        let (role, position) = s
            .rsplit_once('-')
            .ok_or_else(|| OieError::UnknownLabel(s.to_string()))?;
        let role: Role = role
            .parse()
            .map_err(|_| OieError::UnknownLabel(s.to_string()))?;
        match position {
            "B" => Ok(OieTag::Begin(role)),
            "I" => Ok(OieTag::Inside(role)),
            _ => Err(OieError::UnknownLabel(s.to_string())),
        }
    }
}

/// Ordered set of tags a model predicts over.
///
/// `O` is always present at index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet {
    tags: Vec<OieTag>,
}

impl TagSet {
    /// Build a tag set from observed tags.
    pub fn from_tags<I: IntoIterator<Item = OieTag>>(tags: I) -> Self {
        let mut set: BTreeSet<OieTag> = tags.into_iter().collect();
        set.insert(OieTag::Outside);
        Self {
            tags: set.into_iter().collect(),
        }
    }

    /// Build a tag set from label strings such as `"A0-B"`.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let tags = labels
            .iter()
            .map(|l| l.as_ref().parse::<OieTag>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_tags(tags))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Get the tag index for tensor operations.
    pub fn index(&self, tag: OieTag) -> Option<usize> {
        self.tags.binary_search(&tag).ok()
    }

    /// Get tag from index.
    pub fn tag(&self, idx: usize) -> Option<OieTag> {
        self.tags.get(idx).copied()
    }

    pub fn tags(&self) -> &[OieTag] {
        &self.tags
    }

    pub fn contains(&self, tag: OieTag) -> bool {
        self.index(tag).is_some()
    }
}

impl TryFrom<Vec<String>> for TagSet {
    type Error = OieError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::from_labels(&labels)
    }
}

impl From<TagSet> for Vec<String> {
    fn from(set: TagSet) -> Self {
        set.tags.iter().map(ToString::to_string).collect()
    }
}
