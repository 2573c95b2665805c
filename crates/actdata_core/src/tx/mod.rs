//! Transaction engine: atomic commands with undo/redo.
//!
//! # Responsibility
//! - Collect low-level label deltas into commands.
//! - Replay commands backwards (undo) and forwards (redo).
//! - Keep the client transaction payload in lockstep with the command stacks.
//!
//! # Invariants
//! - At most one command is open at a time.
//! - Any commit that records deltas clears the redo stack.
//! - The undo stack never exceeds the configured limit.
//! - While transactions are disabled, nothing is recorded and open/commit/abort
//!   are no-ops. An already-open command survives the disabled period.
//!
//! # See also
//! - `crate::document` for the mutation surface feeding this engine.

mod data;

pub use data::{TxData, TxDatum, UNDEFINED_TX_NAME};

use crate::label::{AttrValue, Entry, LabelData, LabelStore};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default number of undoable commands kept by an engine.
pub const DEFAULT_UNDO_LIMIT: usize = 10;

pub type TxResult<T> = Result<T, TxError>;

/// Contract violations detected by the transaction engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// `open_command` was called while another command is open.
    NestedCommand,
    /// `commit_command` was called without an open command.
    NoOpenCommand,
    /// A persistent write happened outside any command in extended mode.
    MutationOutsideCommand,
    /// Undo/redo was requested while a command is still open.
    CommandStillOpen,
}

impl Display for TxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NestedCommand => write!(f, "nested transactions are prohibited"),
            Self::NoOpenCommand => write!(f, "no command is open"),
            Self::MutationOutsideCommand => {
                write!(f, "persistent modification outside of a transaction")
            }
            Self::CommandStillOpen => write!(f, "a command is still open"),
        }
    }
}

impl Error for TxError {}

/// How unguarded mutations are treated while transactions are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Each unguarded mutation is wrapped into its own anonymous command.
    Simple,
    /// Caller brackets every mutation with open/commit explicitly.
    Extended,
}

/// One reversible low-level modification.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    LabelAdded {
        entry: Entry,
    },
    LabelForgotten {
        entry: Entry,
        data: LabelData,
    },
    AttrSet {
        entry: Entry,
        old: Option<AttrValue>,
        new: AttrValue,
    },
    AttrRemoved {
        entry: Entry,
        old: AttrValue,
    },
}

impl Delta {
    pub fn entry(&self) -> &Entry {
        match self {
            Self::LabelAdded { entry }
            | Self::LabelForgotten { entry, .. }
            | Self::AttrSet { entry, .. }
            | Self::AttrRemoved { entry, .. } => entry,
        }
    }

    pub(crate) fn apply(&self, store: &mut LabelStore) {
        match self {
            Self::LabelAdded { entry } => store.insert_label(entry.clone(), LabelData::default()),
            Self::LabelForgotten { entry, .. } => {
                store.remove_label(entry);
            }
            Self::AttrSet { entry, new, .. } => {
                store.put_attr(entry, new.clone());
            }
            Self::AttrRemoved { entry, old } => {
                store.take_attr(entry, old.kind());
            }
        }
    }

    pub(crate) fn revert(&self, store: &mut LabelStore) {
        match self {
            Self::LabelAdded { entry } => {
                store.remove_label(entry);
            }
            Self::LabelForgotten { entry, data } => store.insert_label(entry.clone(), data.clone()),
            Self::AttrSet { entry, old, new } => match old {
                Some(previous) => {
                    store.put_attr(entry, previous.clone());
                }
                None => {
                    store.take_attr(entry, new.kind());
                }
            },
            Self::AttrRemoved { entry, old } => {
                store.put_attr(entry, old.clone());
            }
        }
    }
}

/// Committed, immutable group of deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    deltas: Vec<Delta>,
    data: TxData,
}

impl Command {
    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    pub fn data(&self) -> &TxData {
        &self.data
    }

    /// Entries of all labels touched by this command.
    pub fn affected_entries(&self) -> BTreeSet<Entry> {
        self.deltas.iter().map(|delta| delta.entry().clone()).collect()
    }

    fn revert(&self, store: &mut LabelStore) {
        for delta in self.deltas.iter().rev() {
            delta.revert(store);
        }
    }

    fn apply(&self, store: &mut LabelStore) {
        for delta in &self.deltas {
            delta.apply(store);
        }
    }
}

/// Undo/redo bookkeeping for one document.
#[derive(Debug)]
pub struct TransactionEngine {
    mode: TxMode,
    enabled: bool,
    open: Option<Vec<Delta>>,
    undos: Vec<Command>,
    redos: Vec<Command>,
    undo_limit: usize,
}

impl TransactionEngine {
    pub fn new(mode: TxMode, undo_limit: usize) -> Self {
        Self {
            mode,
            enabled: true,
            open: None,
            undos: Vec::new(),
            redos: Vec::new(),
            undo_limit,
        }
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn undo_limit(&self) -> usize {
        self.undo_limit
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable_transactions(&mut self) {
        self.enabled = true;
    }

    /// Stops recording. Idempotent; an open command is kept as is.
    pub fn disable_transactions(&mut self) {
        self.enabled = false;
    }

    pub fn has_open_command(&self) -> bool {
        self.open.is_some()
    }

    pub fn nb_undos(&self) -> usize {
        self.undos.len()
    }

    pub fn nb_redos(&self) -> usize {
        self.redos.len()
    }

    /// Most recently committed command.
    pub fn last_undo(&self) -> Option<&Command> {
        self.undos.last()
    }

    pub fn open_command(&mut self) -> TxResult<()> {
        if !self.enabled {
            debug!("event=tx_open module=tx status=skipped reason=transactions_off");
            return Ok(());
        }
        if self.open.is_some() {
            return Err(TxError::NestedCommand);
        }
        self.open = Some(Vec::new());
        Ok(())
    }

    /// Finalizes the open command.
    ///
    /// Returns `Ok(true)` when a command was pushed onto the undo stack and
    /// `Ok(false)` when nothing was recorded.
    pub fn commit_command(&mut self, data: TxData) -> TxResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let deltas = self.open.take().ok_or(TxError::NoOpenCommand)?;
        if deltas.is_empty() {
            return Ok(false);
        }
        let data = match self.mode {
            TxMode::Extended if data.is_empty() => TxData::named(UNDEFINED_TX_NAME),
            _ => data,
        };
        self.push_command(Command { deltas, data });
        Ok(true)
    }

    /// Discards the open command and restores the pre-open state.
    pub fn abort_command(&mut self, store: &mut LabelStore) {
        if !self.enabled {
            return;
        }
        if let Some(deltas) = self.open.take() {
            for delta in deltas.iter().rev() {
                delta.revert(store);
            }
        }
    }

    /// Reverts up to `count` commands, returning the affected entries.
    pub fn undo(&mut self, store: &mut LabelStore, count: usize) -> TxResult<BTreeSet<Entry>> {
        let mut affected = BTreeSet::new();
        if !self.enabled {
            return Ok(affected);
        }
        if self.open.is_some() {
            return Err(TxError::CommandStillOpen);
        }
        if count > self.undos.len() {
            warn!(
                "event=tx_undo module=tx status=clamped requested={} available={}",
                count,
                self.undos.len()
            );
        }
        for _ in 0..count.min(self.undos.len()) {
            let Some(command) = self.undos.pop() else {
                break;
            };
            command.revert(store);
            affected.extend(command.affected_entries());
            self.redos.push(command);
        }
        Ok(affected)
    }

    /// Replays up to `count` undone commands, returning the affected entries.
    pub fn redo(&mut self, store: &mut LabelStore, count: usize) -> TxResult<BTreeSet<Entry>> {
        let mut affected = BTreeSet::new();
        if !self.enabled {
            return Ok(affected);
        }
        if self.open.is_some() {
            return Err(TxError::CommandStillOpen);
        }
        if count > self.redos.len() {
            warn!(
                "event=tx_redo module=tx status=clamped requested={} available={}",
                count,
                self.redos.len()
            );
        }
        for _ in 0..count.min(self.redos.len()) {
            let Some(command) = self.redos.pop() else {
                break;
            };
            command.apply(store);
            affected.extend(command.affected_entries());
            self.undos.push(command);
        }
        Ok(affected)
    }

    /// Payloads of the newest `depth` undoable commands, newest first.
    pub fn undo_data(&self, depth: usize) -> Vec<&TxData> {
        self.undos.iter().rev().take(depth).map(Command::data).collect()
    }

    /// Payloads of the next `depth` redoable commands, next first.
    pub fn redo_data(&self, depth: usize) -> Vec<&TxData> {
        self.redos.iter().rev().take(depth).map(Command::data).collect()
    }

    /// Checks that a persistent write is admissible right now.
    pub(crate) fn admit(&self) -> TxResult<()> {
        if self.enabled && self.open.is_none() && self.mode == TxMode::Extended {
            return Err(TxError::MutationOutsideCommand);
        }
        Ok(())
    }

    /// True when a compound write should be wrapped into an implicit command.
    pub(crate) fn wants_implicit_command(&self) -> bool {
        self.enabled && self.open.is_none() && self.mode == TxMode::Simple
    }

    pub(crate) fn record(&mut self, delta: Delta) {
        if !self.enabled {
            return;
        }
        match self.open.as_mut() {
            Some(deltas) => deltas.push(delta),
            None => self.push_command(Command {
                deltas: vec![delta],
                data: TxData::default(),
            }),
        }
    }

    fn push_command(&mut self, command: Command) {
        self.undos.push(command);
        self.redos.clear();
        if self.undos.len() > self.undo_limit {
            let overflow = self.undos.len() - self.undo_limit;
            self.undos.drain(..overflow);
        }
    }
}
