//! Persistent dirty-state tracker of a document.
//!
//! # Responsibility
//! - Keep four label sets (Touched, Impacted, Forced, HeavyDeploy) under the
//!   LogBook section of the document.
//! - Answer membership queries for labels and data cursors.
//!
//! # Invariants
//! - Inserting an existing label changes nothing.
//! - Sections are independent: releasing one never touches the others.
//! - `clear_references_for` drops a label and every descendant from all four
//!   sections.
//!
//! # See also
//! - `crate::func::execute` for the consumer of these records.

use crate::document::{DocResult, Document};
use crate::label::{AttrKind, AttrValue, Entry};
use crate::param::tree_function::TreeFunctionParameter;
use crate::param::DataCursor;
use std::collections::BTreeSet;

/// Root tag of the LogBook section below the document root.
pub const STRUCTURE_TAG_LOGBOOK: u32 = 4;

/// One of the four LogBook label sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBookSection {
    Touched = 1,
    Impacted = 2,
    Forced = 3,
    HeavyDeploy = 4,
}

impl LogBookSection {
    pub const ALL: [LogBookSection; 4] = [
        Self::Touched,
        Self::Impacted,
        Self::Forced,
        Self::HeavyDeploy,
    ];

    pub fn tag(self) -> u32 {
        self as u32
    }
}

/// Cursor over the LogBook section of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBook {
    root: Entry,
}

impl Default for LogBook {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBook {
    /// LogBook at its canonical location below the document root.
    pub fn new() -> Self {
        Self {
            root: Entry::from_root(&[STRUCTURE_TAG_LOGBOOK]),
        }
    }

    pub fn root(&self) -> &Entry {
        &self.root
    }

    /// Creates the section labels if they do not exist yet.
    pub fn init(&self, doc: &mut Document) -> DocResult<()> {
        doc.ensure_label(&self.root)?;
        for section in LogBookSection::ALL {
            doc.ensure_child(&self.root, section.tag())?;
        }
        Ok(())
    }

    pub fn touch(&self, doc: &mut Document, label: &Entry) -> DocResult<()> {
        self.insert(doc, LogBookSection::Touched, label)
    }

    pub fn impact(&self, doc: &mut Document, label: &Entry) -> DocResult<()> {
        self.insert(doc, LogBookSection::Impacted, label)
    }

    pub fn force(&self, doc: &mut Document, function: &TreeFunctionParameter) -> DocResult<()> {
        self.insert(doc, LogBookSection::Forced, function.root_label())
    }

    pub fn heavy_deploy(
        &self,
        doc: &mut Document,
        function: &TreeFunctionParameter,
    ) -> DocResult<()> {
        self.insert(doc, LogBookSection::HeavyDeploy, function.root_label())
    }

    pub fn is_touched(&self, doc: &Document, label: &Entry) -> bool {
        self.contains(doc, LogBookSection::Touched, label)
    }

    pub fn is_impacted(&self, doc: &Document, label: &Entry) -> bool {
        self.contains(doc, LogBookSection::Impacted, label)
    }

    pub fn is_forced(&self, doc: &Document, label: &Entry) -> bool {
        self.contains(doc, LogBookSection::Forced, label)
    }

    pub fn is_heavy_deployment(&self, doc: &Document, label: &Entry) -> bool {
        self.contains(doc, LogBookSection::HeavyDeploy, label)
    }

    pub fn is_modified(&self, doc: &Document, label: &Entry) -> bool {
        self.is_touched(doc, label) || self.is_impacted(doc, label)
    }

    /// Clears Touched and Impacted.
    pub fn release_modified(&self, doc: &mut Document) -> DocResult<()> {
        self.clear(doc, LogBookSection::Touched)?;
        self.clear(doc, LogBookSection::Impacted)
    }

    pub fn release_forced(&self, doc: &mut Document) -> DocResult<()> {
        self.clear(doc, LogBookSection::Forced)
    }

    pub fn release_heavy_deployment(&self, doc: &mut Document) -> DocResult<()> {
        self.clear(doc, LogBookSection::HeavyDeploy)
    }

    /// Clears all four sections.
    pub fn release_all(&self, doc: &mut Document) -> DocResult<()> {
        for section in LogBookSection::ALL {
            self.clear(doc, section)?;
        }
        Ok(())
    }

    /// Removes one label from one section.
    pub fn remove(&self, doc: &mut Document, section: LogBookSection, label: &Entry) -> DocResult<()> {
        let mut set = self.entries(doc, section);
        if !set.remove(label) {
            return Ok(());
        }
        self.write(doc, section, set)
    }

    /// Removes `label` and every label below it from all sections.
    pub fn clear_references_for(&self, doc: &mut Document, label: &Entry) -> DocResult<()> {
        for section in LogBookSection::ALL {
            let set = self.entries(doc, section);
            let before = set.len();
            let kept: BTreeSet<Entry> = set
                .into_iter()
                .filter(|entry| !entry.is_same_or_descendant_of(label))
                .collect();
            if kept.len() != before {
                self.write(doc, section, kept)?;
            }
        }
        Ok(())
    }

    /// Snapshot of one section.
    pub fn entries(&self, doc: &Document, section: LogBookSection) -> BTreeSet<Entry> {
        doc.attr(&self.section_label(section), AttrKind::LabelSet)
            .and_then(AttrValue::as_label_set)
            .cloned()
            .unwrap_or_default()
    }

    pub fn section_len(&self, doc: &Document, section: LogBookSection) -> usize {
        doc.attr(&self.section_label(section), AttrKind::LabelSet)
            .and_then(AttrValue::as_label_set)
            .map_or(0, BTreeSet::len)
    }

    /// Touched-or-Impacted test for a cursor, locating the LogBook from the
    /// document root.
    pub fn is_modified_cursor(doc: &Document, cursor: &dyn DataCursor) -> bool {
        Self::new().is_modified(doc, cursor.root_label())
    }

    /// HeavyDeploy test for a cursor, locating the LogBook from the document
    /// root.
    pub fn is_pending_cursor(doc: &Document, cursor: &dyn DataCursor) -> bool {
        Self::new().is_heavy_deployment(doc, cursor.root_label())
    }

    fn section_label(&self, section: LogBookSection) -> Entry {
        self.root.child(section.tag())
    }

    fn contains(&self, doc: &Document, section: LogBookSection, label: &Entry) -> bool {
        doc.attr(&self.section_label(section), AttrKind::LabelSet)
            .and_then(AttrValue::as_label_set)
            .is_some_and(|set| set.contains(label))
    }

    fn insert(&self, doc: &mut Document, section: LogBookSection, label: &Entry) -> DocResult<()> {
        if self.contains(doc, section, label) {
            return Ok(());
        }
        let mut set = self.entries(doc, section);
        set.insert(label.clone());
        self.write(doc, section, set)
    }

    fn clear(&self, doc: &mut Document, section: LogBookSection) -> DocResult<()> {
        if self.section_len(doc, section) == 0 {
            return Ok(());
        }
        self.write(doc, section, BTreeSet::new())
    }

    fn write(&self, doc: &mut Document, section: LogBookSection, set: BTreeSet<Entry>) -> DocResult<()> {
        let label = self.section_label(section);
        doc.ensure_label(&label)?;
        doc.set_attr(&label, AttrValue::LabelSet(set))
    }
}
