//! Label addressing.
//!
//! # Responsibility
//! - Represent a label position as an ordered path of integer tags.
//! - Parse and format the `0:t1:t2` entry notation.
//!
//! # Invariants
//! - Every entry starts with the root tag `0`.
//! - Ordering is lexicographic over tags, so a label and all of its
//!   descendants form one contiguous range.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static ENTRY_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^0(:[0-9]+)*$").ok());

/// Position of a label in the document tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entry(Vec<u32>);

impl Entry {
    /// Root label of every document.
    pub fn root() -> Self {
        Self(vec![0])
    }

    /// Builds an entry below the root from relative tags.
    pub fn from_root(tags: &[u32]) -> Self {
        let mut all = Vec::with_capacity(tags.len() + 1);
        all.push(0);
        all.extend_from_slice(tags);
        Self(all)
    }

    pub fn tags(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Own tag of the label (last path element).
    pub fn tag(&self) -> u32 {
        self.0.last().copied().unwrap_or(0)
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    pub fn child(&self, tag: u32) -> Self {
        let mut tags = self.0.clone();
        tags.push(tag);
        Self(tags)
    }

    /// Parent entry, `None` for the root.
    pub fn father(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// True if `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Entry) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }

    pub fn is_same_or_descendant_of(&self, ancestor: &Entry) -> bool {
        self == ancestor || self.is_descendant_of(ancestor)
    }

    /// Keeps the first `count` tags. Returns `None` when the entry is shorter.
    pub fn trimmed(&self, count: usize) -> Option<Self> {
        if self.0.len() < count || count == 0 {
            return None;
        }
        Some(Self(self.0[..count].to_vec()))
    }

    /// Moves the entry from under `from` to under `to`.
    ///
    /// Returns `None` when `self` is not inside the `from` subtree.
    pub fn relocated(&self, from: &Entry, to: &Entry) -> Option<Self> {
        if !self.is_same_or_descendant_of(from) {
            return None;
        }
        let mut tags = to.0.clone();
        tags.extend_from_slice(&self.0[from.0.len()..]);
        Some(Self(tags))
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for tag in &self.0 {
            if !first {
                write!(f, ":")?;
            }
            write!(f, "{tag}")?;
            first = false;
        }
        Ok(())
    }
}

/// Error returned for malformed entry strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryParseError(pub String);

impl Display for EntryParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid label entry `{}`", self.0)
    }
}

impl Error for EntryParseError {}

impl FromStr for Entry {
    type Err = EntryParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let matches = ENTRY_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(trimmed));
        if !matches {
            return Err(EntryParseError(value.to_string()));
        }

        let mut tags = Vec::new();
        for part in trimmed.split(':') {
            let tag = part
                .parse::<u32>()
                .map_err(|_| EntryParseError(value.to_string()))?;
            tags.push(tag);
        }
        Ok(Self(tags))
    }
}
