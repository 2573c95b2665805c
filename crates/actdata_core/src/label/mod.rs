//! In-memory labeled attribute tree backing one document.
//!
//! # Responsibility
//! - Store labels addressed by [`Entry`] together with their typed attributes.
//! - Answer structural queries (children, subtree) without recursion.
//!
//! # Invariants
//! - The root label `0` always exists.
//! - A label holds at most one attribute per [`AttrKind`].
//! - Mutators are crate-private: persistent writes go through
//!   [`crate::document::Document`] so that they are recorded by transactions.
//!
//! # See also
//! - `crate::document` for the transactional mutation surface.

mod entry;

pub use entry::{Entry, EntryParseError};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use uuid::Uuid;

/// Discriminant of a stored attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttrKind {
    Integer,
    Real,
    AsciiString,
    Name,
    IntArray,
    RealArray,
    BoolArray,
    StringArray,
    Reference,
    ReferenceList,
    LabelSet,
    Driver,
    GraphNode,
    TimeStamp,
    Bytes,
}

impl AttrKind {
    /// Stable persisted name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::AsciiString => "ascii_string",
            Self::Name => "name",
            Self::IntArray => "int_array",
            Self::RealArray => "real_array",
            Self::BoolArray => "bool_array",
            Self::StringArray => "string_array",
            Self::Reference => "reference",
            Self::ReferenceList => "reference_list",
            Self::LabelSet => "label_set",
            Self::Driver => "driver",
            Self::GraphNode => "graph_node",
            Self::TimeStamp => "time_stamp",
            Self::Bytes => "bytes",
        }
    }
}

/// Typed attribute payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Integer(i32),
    Real(f64),
    AsciiString(String),
    Name(String),
    IntArray(Vec<i32>),
    RealArray(Vec<f64>),
    BoolArray(Vec<bool>),
    StringArray(Vec<String>),
    Reference(Entry),
    ReferenceList(Vec<Entry>),
    LabelSet(BTreeSet<Entry>),
    /// GUID of a tree-function driver.
    Driver(Uuid),
    /// Marker registering a label in the function dependency graph.
    GraphNode,
    /// Milliseconds since the Unix epoch.
    TimeStamp(i64),
    Bytes(Vec<u8>),
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            Self::Integer(_) => AttrKind::Integer,
            Self::Real(_) => AttrKind::Real,
            Self::AsciiString(_) => AttrKind::AsciiString,
            Self::Name(_) => AttrKind::Name,
            Self::IntArray(_) => AttrKind::IntArray,
            Self::RealArray(_) => AttrKind::RealArray,
            Self::BoolArray(_) => AttrKind::BoolArray,
            Self::StringArray(_) => AttrKind::StringArray,
            Self::Reference(_) => AttrKind::Reference,
            Self::ReferenceList(_) => AttrKind::ReferenceList,
            Self::LabelSet(_) => AttrKind::LabelSet,
            Self::Driver(_) => AttrKind::Driver,
            Self::GraphNode => AttrKind::GraphNode,
            Self::TimeStamp(_) => AttrKind::TimeStamp,
            Self::Bytes(_) => AttrKind::Bytes,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::AsciiString(value) | Self::Name(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Entry> {
        match self {
            Self::Reference(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_reference_list(&self) -> Option<&[Entry]> {
        match self {
            Self::ReferenceList(targets) => Some(targets),
            _ => None,
        }
    }

    pub fn as_label_set(&self) -> Option<&BTreeSet<Entry>> {
        match self {
            Self::LabelSet(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_driver(&self) -> Option<Uuid> {
        match self {
            Self::Driver(guid) => Some(*guid),
            _ => None,
        }
    }
}

/// Attributes attached to one label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelData {
    attrs: BTreeMap<AttrKind, AttrValue>,
}

impl LabelData {
    pub fn get(&self, kind: AttrKind) -> Option<&AttrValue> {
        self.attrs.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttrValue> {
        self.attrs.values()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub(crate) fn put(&mut self, value: AttrValue) -> Option<AttrValue> {
        self.attrs.insert(value.kind(), value)
    }

    pub(crate) fn take(&mut self, kind: AttrKind) -> Option<AttrValue> {
        self.attrs.remove(&kind)
    }
}

/// Ordered label tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStore {
    labels: BTreeMap<Entry, LabelData>,
}

impl Default for LabelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelStore {
    /// Creates a store holding only the root label.
    pub fn new() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(Entry::root(), LabelData::default());
        Self { labels }
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.labels.contains_key(entry)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.len() <= 1
    }

    pub fn label(&self, entry: &Entry) -> Option<&LabelData> {
        self.labels.get(entry)
    }

    pub fn attr(&self, entry: &Entry, kind: AttrKind) -> Option<&AttrValue> {
        self.labels.get(entry).and_then(|data| data.get(kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Entry, &LabelData)> {
        self.labels.iter()
    }

    /// Direct children of `entry` in tag order.
    pub fn children(&self, entry: &Entry) -> Vec<Entry> {
        let child_depth = entry.depth() + 1;
        self.descendants_range(entry)
            .filter(|(candidate, _)| candidate.depth() == child_depth)
            .map(|(candidate, _)| candidate.clone())
            .collect()
    }

    /// `entry` followed by all of its descendants in entry order.
    pub fn subtree(&self, entry: &Entry) -> Vec<Entry> {
        if !self.contains(entry) {
            return Vec::new();
        }
        let mut result = vec![entry.clone()];
        result.extend(
            self.descendants_range(entry)
                .map(|(candidate, _)| candidate.clone()),
        );
        result
    }

    /// Largest child tag of `entry`, or 0 when it has no children.
    pub fn last_child_tag(&self, entry: &Entry) -> u32 {
        self.children(entry)
            .iter()
            .map(Entry::tag)
            .max()
            .unwrap_or(0)
    }

    fn descendants_range<'a>(
        &'a self,
        entry: &'a Entry,
    ) -> impl Iterator<Item = (&'a Entry, &'a LabelData)> + 'a {
        self.labels
            .range((Bound::Excluded(entry.clone()), Bound::Unbounded))
            .take_while(move |(candidate, _)| candidate.is_descendant_of(entry))
    }

    pub(crate) fn insert_label(&mut self, entry: Entry, data: LabelData) {
        self.labels.insert(entry, data);
    }

    pub(crate) fn remove_label(&mut self, entry: &Entry) -> Option<LabelData> {
        if entry.is_root() {
            return None;
        }
        self.labels.remove(entry)
    }

    pub(crate) fn put_attr(&mut self, entry: &Entry, value: AttrValue) -> Option<AttrValue> {
        self.labels.entry(entry.clone()).or_default().put(value)
    }

    pub(crate) fn take_attr(&mut self, entry: &Entry, kind: AttrKind) -> Option<AttrValue> {
        self.labels.get_mut(entry).and_then(|data| data.take(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::{AttrKind, AttrValue, Entry, LabelData, LabelStore};

    fn sample_store() -> LabelStore {
        let mut store = LabelStore::new();
        for tags in [&[2][..], &[2, 1], &[2, 1, 3], &[2, 2], &[3]] {
            store.insert_label(Entry::from_root(tags), LabelData::default());
        }
        store
    }

    #[test]
    fn new_store_holds_root_only() {
        let store = LabelStore::new();
        assert!(store.contains(&Entry::root()));
        assert!(store.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn children_are_direct_and_ordered() {
        let store = sample_store();
        let children = store.children(&Entry::from_root(&[2]));
        assert_eq!(
            children,
            vec![Entry::from_root(&[2, 1]), Entry::from_root(&[2, 2])]
        );
        assert_eq!(store.last_child_tag(&Entry::from_root(&[2])), 2);
        assert_eq!(store.last_child_tag(&Entry::from_root(&[3])), 0);
    }

    #[test]
    fn subtree_includes_self_and_all_descendants() {
        let store = sample_store();
        let subtree = store.subtree(&Entry::from_root(&[2, 1]));
        assert_eq!(
            subtree,
            vec![Entry::from_root(&[2, 1]), Entry::from_root(&[2, 1, 3])]
        );
        assert!(store.subtree(&Entry::from_root(&[9])).is_empty());
    }

    #[test]
    fn one_attribute_per_kind() {
        let mut store = sample_store();
        let entry = Entry::from_root(&[3]);
        assert_eq!(store.put_attr(&entry, AttrValue::Integer(1)), None);
        assert_eq!(
            store.put_attr(&entry, AttrValue::Integer(2)),
            Some(AttrValue::Integer(1))
        );
        assert_eq!(
            store.attr(&entry, AttrKind::Integer),
            Some(&AttrValue::Integer(2))
        );
        assert_eq!(
            store.take_attr(&entry, AttrKind::Integer),
            Some(AttrValue::Integer(2))
        );
        assert_eq!(store.attr(&entry, AttrKind::Integer), None);
    }

    #[test]
    fn root_cannot_be_removed() {
        let mut store = LabelStore::new();
        assert_eq!(store.remove_label(&Entry::root()), None);
        assert!(store.contains(&Entry::root()));
    }
}
