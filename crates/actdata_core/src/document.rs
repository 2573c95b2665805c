//! Transactional document: label store plus transaction engine.
//!
//! # Responsibility
//! - Expose the only mutation surface for persistent label data.
//! - Record every mutation as a reversible delta in the transaction engine.
//!
//! # Invariants
//! - Attributes are only written to existing labels.
//! - The root label is never removed.
//! - In extended mode, writes without an open command are rejected before
//!   they reach the store.

use crate::label::{AttrKind, AttrValue, Entry, LabelStore};
use crate::tx::{Delta, TransactionEngine, TxData, TxError, TxMode, TxResult};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DocResult<T> = Result<T, DocError>;

#[derive(Debug, Clone, PartialEq)]
pub enum DocError {
    Transaction(TxError),
    LabelNotFound(Entry),
    RootImmutable,
}

impl Display for DocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transaction(err) => write!(f, "{err}"),
            Self::LabelNotFound(entry) => write!(f, "label not found: {entry}"),
            Self::RootImmutable => write!(f, "root label cannot be removed"),
        }
    }
}

impl Error for DocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transaction(err) => Some(err),
            Self::LabelNotFound(_) => None,
            Self::RootImmutable => None,
        }
    }
}

impl From<TxError> for DocError {
    fn from(value: TxError) -> Self {
        Self::Transaction(value)
    }
}

/// One open document.
#[derive(Debug)]
pub struct Document {
    store: LabelStore,
    tx: TransactionEngine,
}

impl Document {
    pub fn new(mode: TxMode, undo_limit: usize) -> Self {
        Self::with_store(LabelStore::new(), mode, undo_limit)
    }

    pub(crate) fn with_store(store: LabelStore, mode: TxMode, undo_limit: usize) -> Self {
        Self {
            store,
            tx: TransactionEngine::new(mode, undo_limit),
        }
    }

    pub fn store(&self) -> &LabelStore {
        &self.store
    }

    pub fn transactions(&self) -> &TransactionEngine {
        &self.tx
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.store.contains(entry)
    }

    pub fn attr(&self, entry: &Entry, kind: AttrKind) -> Option<&AttrValue> {
        self.store.attr(entry, kind)
    }

    pub fn children(&self, entry: &Entry) -> Vec<Entry> {
        self.store.children(entry)
    }

    pub fn subtree(&self, entry: &Entry) -> Vec<Entry> {
        self.store.subtree(entry)
    }

    /// Existing child with the given tag.
    pub fn find_child(&self, parent: &Entry, tag: u32) -> Option<Entry> {
        let child = parent.child(tag);
        self.store.contains(&child).then_some(child)
    }

    /// Returns the child with the given tag, creating it when missing.
    pub fn ensure_child(&mut self, parent: &Entry, tag: u32) -> DocResult<Entry> {
        if !self.store.contains(parent) {
            return Err(DocError::LabelNotFound(parent.clone()));
        }
        let child = parent.child(tag);
        if !self.store.contains(&child) {
            self.apply(Delta::LabelAdded {
                entry: child.clone(),
            })?;
        }
        Ok(child)
    }

    /// Creates `entry` together with any missing ancestors.
    pub fn ensure_label(&mut self, entry: &Entry) -> DocResult<()> {
        let mut current = Entry::root();
        for tag in entry.tags().iter().skip(1) {
            current = self.ensure_child(&current, *tag)?;
        }
        Ok(())
    }

    /// Appends a child right after the last existing one.
    pub fn new_child(&mut self, parent: &Entry) -> DocResult<Entry> {
        let tag = self.store.last_child_tag(parent) + 1;
        self.ensure_child(parent, tag)
    }

    /// Writes an attribute. Writing an equal value records nothing.
    pub fn set_attr(&mut self, entry: &Entry, value: AttrValue) -> DocResult<()> {
        if !self.store.contains(entry) {
            return Err(DocError::LabelNotFound(entry.clone()));
        }
        let old = self.store.attr(entry, value.kind()).cloned();
        if old.as_ref() == Some(&value) {
            return Ok(());
        }
        self.apply(Delta::AttrSet {
            entry: entry.clone(),
            old,
            new: value,
        })
    }

    pub fn remove_attr(&mut self, entry: &Entry, kind: AttrKind) -> DocResult<Option<AttrValue>> {
        let Some(old) = self.store.attr(entry, kind).cloned() else {
            return Ok(None);
        };
        self.apply(Delta::AttrRemoved {
            entry: entry.clone(),
            old: old.clone(),
        })?;
        Ok(Some(old))
    }

    /// Removes every attribute of `entry`, keeping the label itself.
    pub fn forget_all_attributes(&mut self, entry: &Entry) -> DocResult<()> {
        let kinds: Vec<AttrKind> = match self.store.label(entry) {
            Some(data) => data.iter().map(AttrValue::kind).collect(),
            None => return Ok(()),
        };
        for kind in kinds {
            self.remove_attr(entry, kind)?;
        }
        Ok(())
    }

    /// Removes `entry` and its whole subtree, deepest labels first.
    pub fn forget_subtree(&mut self, entry: &Entry) -> DocResult<()> {
        if entry.is_root() {
            return Err(DocError::RootImmutable);
        }
        let subtree = self.store.subtree(entry);
        for label in subtree.into_iter().rev() {
            let data = self.store.label(&label).cloned().unwrap_or_default();
            self.apply(Delta::LabelForgotten { entry: label, data })?;
        }
        Ok(())
    }

    /// Runs a compound mutation as one implicit command in simple mode.
    ///
    /// With an explicit command open, in extended mode, or with transactions
    /// disabled, `f` runs as is. A failed implicit command is aborted.
    pub fn atomic<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DocError>,
    {
        if !self.tx.wants_implicit_command() {
            return f(self);
        }
        self.tx.open_command().map_err(DocError::from)?;
        match f(self) {
            Ok(value) => {
                self.tx
                    .commit_command(TxData::default())
                    .map_err(DocError::from)?;
                Ok(value)
            }
            Err(err) => {
                self.tx.abort_command(&mut self.store);
                Err(err)
            }
        }
    }

    pub fn open_command(&mut self) -> TxResult<()> {
        self.tx.open_command()
    }

    pub fn commit_command(&mut self, data: TxData) -> TxResult<bool> {
        self.tx.commit_command(data)
    }

    pub fn abort_command(&mut self) {
        self.tx.abort_command(&mut self.store);
    }

    pub fn has_open_command(&self) -> bool {
        self.tx.has_open_command()
    }

    pub fn undo(&mut self, count: usize) -> TxResult<BTreeSet<Entry>> {
        self.tx.undo(&mut self.store, count)
    }

    pub fn redo(&mut self, count: usize) -> TxResult<BTreeSet<Entry>> {
        self.tx.redo(&mut self.store, count)
    }

    pub fn nb_undos(&self) -> usize {
        self.tx.nb_undos()
    }

    pub fn nb_redos(&self) -> usize {
        self.tx.nb_redos()
    }

    pub fn enable_transactions(&mut self) {
        self.tx.enable_transactions();
    }

    pub fn disable_transactions(&mut self) {
        self.tx.disable_transactions();
    }

    pub fn is_transaction_mode_on(&self) -> bool {
        self.tx.is_enabled()
    }

    /// Runs `f` with transactions disabled, restoring the previous mode.
    pub fn untracked<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let was_enabled = self.tx.is_enabled();
        self.tx.disable_transactions();
        let result = f(self);
        if was_enabled {
            self.tx.enable_transactions();
        }
        result
    }

    fn apply(&mut self, delta: Delta) -> DocResult<()> {
        self.tx.admit()?;
        delta.apply(&mut self.store);
        self.tx.record(delta);
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(TxMode::Extended, crate::tx::DEFAULT_UNDO_LIMIT)
    }
}
