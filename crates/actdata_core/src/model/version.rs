//! Version binding and conversion of stored documents.
//!
//! # Invariants
//! - Framework and application versions live at `0:1:1` and `0:1:2`.
//! - A version that was never bound reads as [`VERSION_NOT_BOUND`].
//! - A conversion chain only moves forward and never skips a missing step.

use crate::document::{DocResult, Document};
use crate::label::{AttrKind, AttrValue, Entry};
use log::{debug, warn};

/// Structure tag of the version section.
pub const STRUCTURE_TAG_VERSION: u32 = 1;
pub const VERSION_TAG_FRAMEWORK: u32 = 1;
pub const VERSION_TAG_APPLICATION: u32 = 2;

/// Version of the document layout produced by this crate, as `0xMMmmpp`.
pub const ACTUAL_VERSION_FRAMEWORK: i32 = 0x00_01_00;

/// Stored version of a document that never had versions bound.
pub const VERSION_NOT_BOUND: i32 = -1;

/// Compatibility of the loaded document with this binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionStatus {
    #[default]
    Undefined,
    Ok,
    NotBoundFail,
    LessFail,
    LessOk,
    HigherFail,
}

impl VersionStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::NotBoundFail | Self::LessFail | Self::HigherFail)
    }
}

/// Upgrades a document from a stored version to the actual one.
pub trait Converter {
    /// Returns `false` when the document cannot be brought to `actual`.
    fn perform(&self, doc: &mut Document, stored: i32, actual: i32) -> bool;
}

type Routine = Box<dyn Fn(&mut Document) -> bool>;

/// Converter made of `(from, to, routine)` steps.
#[derive(Default)]
pub struct ConversionChain {
    steps: Vec<(i32, i32, Routine)>,
}

impl std::fmt::Debug for ConversionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|(from, to, _)| (from, to)))
            .finish()
    }
}

impl ConversionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step converting documents of version `from` to version `to`.
    pub fn step(mut self, from: i32, to: i32, routine: impl Fn(&mut Document) -> bool + 'static) -> Self {
        self.steps.push((from, to, Box::new(routine)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Converter for ConversionChain {
    fn perform(&self, doc: &mut Document, stored: i32, actual: i32) -> bool {
        let mut current = stored;
        while current < actual {
            let Some((_, to, routine)) = self
                .steps
                .iter()
                .find(|(from, to, _)| *from == current && *to > current)
            else {
                warn!(
                    "event=convert module=model status=error reason=missing_step from={} actual={}",
                    current, actual
                );
                return false;
            };
            if !routine(doc) {
                warn!(
                    "event=convert module=model status=error reason=step_failed from={} to={}",
                    current, to
                );
                return false;
            }
            debug!("event=convert module=model status=step from={} to={}", current, to);
            current = *to;
        }
        current == actual
    }
}

pub(crate) fn version_label(tag: u32) -> Entry {
    Entry::from_root(&[STRUCTURE_TAG_VERSION, tag])
}

/// Stored framework version, or [`VERSION_NOT_BOUND`].
pub fn stored_version_framework(doc: &Document) -> i32 {
    stored_version(doc, VERSION_TAG_FRAMEWORK)
}

/// Stored application version, or [`VERSION_NOT_BOUND`].
pub fn stored_version_app(doc: &Document) -> i32 {
    stored_version(doc, VERSION_TAG_APPLICATION)
}

fn stored_version(doc: &Document, tag: u32) -> i32 {
    doc.attr(&version_label(tag), AttrKind::Integer)
        .and_then(AttrValue::as_integer)
        .unwrap_or(VERSION_NOT_BOUND)
}

/// Writes the actual framework and application versions.
pub(crate) fn bind_version_info(doc: &mut Document, actual_app: i32) -> DocResult<()> {
    for (tag, version) in [
        (VERSION_TAG_FRAMEWORK, ACTUAL_VERSION_FRAMEWORK),
        (VERSION_TAG_APPLICATION, actual_app),
    ] {
        let label = version_label(tag);
        doc.ensure_label(&label)?;
        doc.set_attr(&label, AttrValue::Integer(version))?;
    }
    Ok(())
}
