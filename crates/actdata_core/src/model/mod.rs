//! Base model: the document-level API over partitions and nodes.
//!
//! # Responsibility
//! - Own one document together with its partition registry, tree-function
//!   drivers and execution context.
//! - Forward the transaction surface and translate undo/redo results into
//!   parameter references.
//! - Provide structure management: find, add, delete, rename, copy/paste.
//!
//! # Invariants
//! - Nothing here is shared between models; releasing a model drops its
//!   document, context and copy state.
//! - Structure operations fail with `NotInitialized` before `new_empty` or a
//!   successful `open`.
//! - Deleting a node never leaves a reference or LogBook record pointing into
//!   the removed subtree.
//!
//! # See also
//! - `execute` for `func_execute_all`.
//! - `loader` for `open` and `save_as`.

pub mod copy_paste;
pub mod execute;
mod loader;
pub mod node;
pub mod partition;
pub mod version;

pub use copy_paste::SuffixOption;
pub use execute::{ExecFlags, ExecutionReport, ExecutionStatus};
pub use node::{Node, NodeType, ParamSlot};
pub use partition::{Partition, VariableKind};
pub use version::{ConversionChain, Converter, VersionStatus, ACTUAL_VERSION_FRAMEWORK};

use crate::db::DbError;
use crate::document::{DocError, Document};
use crate::exec::FuncExecutionCtx;
use crate::func::{FunctionRegistry, TreeFunction};
use crate::graph::AnalyzerError;
use crate::label::{AttrKind, AttrValue, Entry};
use crate::logbook::{LogBook, LogBookSection};
use crate::param::factory::param_by_child_label_settle;
use crate::param::{DataCursor, ModificationType, ParamError, ParamValue};
use crate::repo::RepoError;
use crate::tx::{TxData, TxError, TxMode, DEFAULT_UNDO_LIMIT};
use bitflags::bitflags;
use copy_paste::CopyState;
use log::{error, info, warn};
use partition::STRUCTURE_TAG_PARTITIONS;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Number of tags of a node root entry.
pub const NODE_ENTRY_DEPTH: usize = 4;
/// Number of tags of a parameter entry.
pub const PARAM_ENTRY_DEPTH: usize = 6;

bitflags! {
    /// Lifecycle flags of a model.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModelStatus: u32 {
        const UNDEFINED = 0x1;
        const INITIALIZED = 0x2;
        const MODIFIED = 0x4;
        const SAVED = 0x8;
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug)]
pub enum ModelError {
    Doc(DocError),
    Tx(TxError),
    Param(ParamError),
    Db(DbError),
    Repo(RepoError),
    Analyzer(AnalyzerError),
    PartitionNotRegistered(u32),
    NodeNotFound(String),
    NotInitialized,
    /// A loaded node does not match its declared type.
    MalformedDocument,
    /// Open stopped on a version check or a failed conversion.
    Version(VersionStatus),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Doc(err) => write!(f, "{err}"),
            Self::Tx(err) => write!(f, "{err}"),
            Self::Param(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Analyzer(err) => write!(f, "{err}"),
            Self::PartitionNotRegistered(type_id) => write!(f, "partition {type_id} is not registered"),
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::NotInitialized => write!(f, "model is not initialized"),
            Self::MalformedDocument => write!(f, "document has malformed nodes"),
            Self::Version(status) => write!(f, "document version check failed: {status:?}"),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Doc(err) => Some(err),
            Self::Tx(err) => Some(err),
            Self::Param(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Analyzer(err) => Some(err),
            Self::PartitionNotRegistered(_) => None,
            Self::NodeNotFound(_) => None,
            Self::NotInitialized => None,
            Self::MalformedDocument => None,
            Self::Version(_) => None,
        }
    }
}

impl From<DocError> for ModelError {
    fn from(value: DocError) -> Self {
        Self::Doc(value)
    }
}

impl From<TxError> for ModelError {
    fn from(value: TxError) -> Self {
        Self::Tx(value)
    }
}

impl From<ParamError> for ModelError {
    fn from(value: ParamError) -> Self {
        Self::Param(value)
    }
}

impl From<DbError> for ModelError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for ModelError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<AnalyzerError> for ModelError {
    fn from(value: AnalyzerError) -> Self {
        Self::Analyzer(value)
    }
}

/// Construction-time settings of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    pub tx_mode: TxMode,
    pub undo_limit: usize,
    pub exec_flags: ExecFlags,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            tx_mode: TxMode::Extended,
            undo_limit: DEFAULT_UNDO_LIMIT,
            exec_flags: ExecFlags::empty(),
        }
    }
}

/// What the embedding application contributes to its documents.
pub trait ModelSchema {
    /// Partitions to register, keyed by type id.
    fn node_types(&self) -> Vec<(u32, NodeType)>;

    fn drivers(&self) -> Vec<Box<dyn TreeFunction>> {
        Vec::new()
    }

    fn actual_version_app(&self) -> i32;

    fn converter_app(&self) -> Option<&dyn Converter> {
        None
    }
}

/// Parameter affected by an undo or redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRef {
    pub id: Entry,
    /// False when the parameter no longer exists after the replay.
    pub is_alive: bool,
    pub is_unknown_type: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoOutcome {
    pub params: Vec<ParamRef>,
}

impl UndoOutcome {
    pub fn alive(&self) -> impl Iterator<Item = &ParamRef> {
        self.params.iter().filter(|param| param.is_alive)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Borrowed view of the model handed to privileged collaborators.
pub(crate) struct ModelParts<'m> {
    pub doc: &'m mut Document,
    pub node_types: &'m BTreeMap<u32, NodeType>,
    pub copy: &'m mut CopyState,
}

/// Narrow access used by the copy/paste engine.
pub(crate) trait ModelInternals {
    fn parts(&mut self) -> ModelParts<'_>;
}

#[derive(Clone, Copy)]
enum Replay {
    Undo,
    Redo,
}

impl Replay {
    fn event(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

pub struct BaseModel<S: ModelSchema> {
    schema: S,
    config: ModelConfig,
    doc: Document,
    status: ModelStatus,
    version_status: VersionStatus,
    node_types: BTreeMap<u32, NodeType>,
    registry: FunctionRegistry,
    ctx: FuncExecutionCtx,
    copy: CopyState,
}

impl<S: ModelSchema> std::fmt::Debug for BaseModel<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseModel")
            .field("status", &self.status)
            .field("version_status", &self.version_status)
            .field("partitions", &self.node_types.keys().collect::<Vec<_>>())
            .field("drivers", &self.registry)
            .finish()
    }
}

impl<S: ModelSchema> ModelInternals for BaseModel<S> {
    fn parts(&mut self) -> ModelParts<'_> {
        ModelParts {
            doc: &mut self.doc,
            node_types: &self.node_types,
            copy: &mut self.copy,
        }
    }
}

impl<S: ModelSchema> BaseModel<S> {
    /// Creates an empty, uninitialized model.
    pub fn new(schema: S, config: ModelConfig) -> Self {
        Self {
            doc: Document::new(config.tx_mode, config.undo_limit),
            schema,
            config,
            status: ModelStatus::UNDEFINED,
            version_status: VersionStatus::Undefined,
            node_types: BTreeMap::new(),
            registry: FunctionRegistry::new(),
            ctx: FuncExecutionCtx::new(),
            copy: CopyState::default(),
        }
    }

    /// Replaces the document with a fresh one carrying every registered
    /// partition, the LogBook and the actual versions.
    pub fn new_empty(&mut self) -> ModelResult<()> {
        let started_at = Instant::now();
        info!("event=new_empty module=model status=start");
        self.release(VersionStatus::Undefined);
        self.init_registries();

        let type_ids: Vec<u32> = self.node_types.keys().copied().collect();
        let actual_app = self.schema.actual_version_app();
        let result = self.doc.untracked(|doc| -> ModelResult<()> {
            for type_id in type_ids {
                Partition::new(type_id).init(doc)?;
            }
            doc.ensure_label(&copy_paste::buffer_root())?;
            LogBook::new().init(doc)?;
            version::bind_version_info(doc, actual_app)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                self.status = ModelStatus::INITIALIZED;
                self.version_status = VersionStatus::Ok;
                info!(
                    "event=new_empty module=model status=ok partitions={} drivers={} duration_ms={}",
                    self.node_types.len(),
                    self.registry.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=new_empty module=model status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                self.release(VersionStatus::Undefined);
                Err(err)
            }
        }
    }

    /// Drops the document and all per-document state.
    pub fn release(&mut self, version_status: VersionStatus) {
        self.doc = Document::new(self.config.tx_mode, self.config.undo_limit);
        self.status = ModelStatus::UNDEFINED;
        self.version_status = version_status;
        self.ctx = FuncExecutionCtx::new();
        self.copy.clear();
    }

    pub fn schema(&self) -> &S {
        &self.schema
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn version_status(&self) -> VersionStatus {
        self.version_status
    }

    pub fn is_initialized(&self) -> bool {
        self.status.contains(ModelStatus::INITIALIZED)
    }

    pub fn is_modified(&self) -> bool {
        self.status.contains(ModelStatus::MODIFIED)
    }

    pub fn stored_version_framework(&self) -> i32 {
        version::stored_version_framework(&self.doc)
    }

    pub fn stored_version_app(&self) -> i32 {
        version::stored_version_app(&self.doc)
    }

    pub fn actual_version_framework(&self) -> i32 {
        ACTUAL_VERSION_FRAMEWORK
    }

    pub fn actual_version_app(&self) -> i32 {
        self.schema.actual_version_app()
    }

    // Transactions

    pub fn open_command(&mut self) -> ModelResult<()> {
        Ok(self.doc.open_command()?)
    }

    /// Commits the open command. A commit that records something marks the
    /// model modified.
    pub fn commit_command(&mut self, data: TxData) -> ModelResult<bool> {
        let committed = self.doc.commit_command(data)?;
        if committed {
            self.status.insert(ModelStatus::MODIFIED);
        }
        Ok(committed)
    }

    pub fn abort_command(&mut self) {
        self.doc.abort_command();
    }

    pub fn has_open_command(&self) -> bool {
        self.doc.has_open_command()
    }

    pub fn nb_undos(&self) -> usize {
        self.doc.nb_undos()
    }

    pub fn nb_redos(&self) -> usize {
        self.doc.nb_redos()
    }

    pub fn enable_transactions(&mut self) {
        self.doc.enable_transactions();
    }

    pub fn disable_transactions(&mut self) {
        self.doc.disable_transactions();
    }

    pub fn undo(&mut self, count: usize) -> ModelResult<UndoOutcome> {
        self.replay(Replay::Undo, count)
    }

    pub fn redo(&mut self, count: usize) -> ModelResult<UndoOutcome> {
        self.replay(Replay::Redo, count)
    }

    /// Nodes touched by the last committed command.
    pub fn get_modified_nodes(&self) -> Vec<Node> {
        let Some(command) = self.doc.transactions().last_undo() else {
            return Vec::new();
        };
        let roots: BTreeSet<Entry> = command
            .affected_entries()
            .iter()
            .filter(|entry| is_partition_entry(entry))
            .filter_map(|entry| entry.trimmed(NODE_ENTRY_DEPTH))
            .collect();
        roots
            .into_iter()
            .filter_map(|root| self.find_node(&root))
            .collect()
    }

    fn replay(&mut self, direction: Replay, count: usize) -> ModelResult<UndoOutcome> {
        let started_at = Instant::now();
        let event = direction.event();
        info!("event={} module=model status=start count={}", event, count);

        let pending = PendingRecords::capture(&self.doc);
        let replayed = match direction {
            Replay::Undo => self.doc.undo(count),
            Replay::Redo => self.doc.redo(count),
        };
        let affected = match replayed {
            Ok(affected) => affected,
            Err(err) => {
                error!(
                    "event={} module=model status=error duration_ms={} error={}",
                    event,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        let collected = self.doc.untracked(|doc| {
            pending.restore(doc)?;
            collect_undo_outcome(doc, &affected)
        });
        match collected {
            Ok(outcome) => {
                info!(
                    "event={} module=model status=ok params={} duration_ms={}",
                    event,
                    outcome.params.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    "event={} module=model status=error duration_ms={} error={}",
                    event,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    // Structure

    pub fn partition(&self, type_id: u32) -> ModelResult<Partition> {
        if !self.node_types.contains_key(&type_id) {
            return Err(ModelError::PartitionNotRegistered(type_id));
        }
        Ok(Partition::new(type_id))
    }

    pub fn partitions(&self) -> Vec<Partition> {
        self.node_types.keys().copied().map(Partition::new).collect()
    }

    pub fn node_type(&self, type_id: u32) -> Option<&NodeType> {
        self.node_types.get(&type_id)
    }

    /// Appends a new node to the partition of `type_id`.
    pub fn add_node(&mut self, type_id: u32, name: &str) -> ModelResult<Node> {
        self.ensure_initialized()?;
        let node_type = self
            .node_types
            .get(&type_id)
            .ok_or(ModelError::PartitionNotRegistered(type_id))?;
        Ok(Partition::new(type_id).add_node(&mut self.doc, node_type, name)?)
    }

    /// Node rooted at `entry`, if it exists in a registered partition.
    pub fn find_node(&self, entry: &Entry) -> Option<Node> {
        if entry.depth() != NODE_ENTRY_DEPTH || !is_partition_entry(entry) {
            return None;
        }
        let type_id = entry.tags()[2];
        if !self.node_types.contains_key(&type_id) || !self.doc.contains(entry) {
            return None;
        }
        let node = Node::settle_on(entry.clone());
        node.is_well_formed(&self.doc).then_some(node)
    }

    /// Node by its data object id (`0:2:<type>:<n>`).
    pub fn find_node_by_id(&self, id: &str) -> Option<Node> {
        id.parse::<Entry>().ok().and_then(|entry| self.find_node(&entry))
    }

    /// Well-formed nodes named `name` across all partitions.
    pub fn find_nodes_by_name(&self, name: &str) -> Vec<Node> {
        self.partitions()
            .iter()
            .flat_map(|partition| partition.nodes(&self.doc))
            .filter(|node| node.is_well_formed(&self.doc))
            .filter(|node| node.name(&self.doc).as_deref() == Some(name))
            .collect()
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<Node> {
        self.find_nodes_by_name(name).into_iter().next()
    }

    /// Node whose name chain from the top ancestor down matches `names`.
    ///
    /// `names` lists the root first and the searched node last.
    pub fn find_node_by_names(&self, names: &[&str]) -> Option<Node> {
        let (leaf, ancestors) = names.split_last()?;
        if ancestors.is_empty() {
            return self.find_node_by_name(leaf);
        }
        self.find_nodes_by_name(leaf).into_iter().find(|candidate| {
            let mut current = candidate.clone();
            for expected in ancestors.iter().rev() {
                let Some(parent) = current.parent(&self.doc) else {
                    return false;
                };
                if parent.name(&self.doc).as_deref() != Some(*expected) {
                    return false;
                }
                current = parent;
            }
            true
        })
    }

    pub fn add_child_node(&mut self, parent: &Node, child: &Node) -> ModelResult<()> {
        self.ensure_initialized()?;
        self.ensure_exists(parent)?;
        self.ensure_exists(child)?;
        Ok(parent.add_child_node(&mut self.doc, child)?)
    }

    pub fn remove_child_node(&mut self, parent: &Node, child: &Node) -> ModelResult<bool> {
        self.ensure_initialized()?;
        self.ensure_exists(parent)?;
        Ok(parent.remove_child_node(&mut self.doc, child)?)
    }

    pub fn rename_node(&mut self, node: &Node, name: &str) -> ModelResult<()> {
        self.ensure_initialized()?;
        self.ensure_exists(node)?;
        Ok(node.set_name(&mut self.doc, name)?)
    }

    /// Adds a named Bool, Int or Real variable to its framework partition.
    pub fn add_variable(&mut self, kind: VariableKind, name: &str) -> ModelResult<Node> {
        self.ensure_initialized()?;
        let node_type = kind.node_type();
        let partition = self.partition(kind.type_id())?;
        self.doc.atomic(|doc| -> ModelResult<Node> {
            let node = partition.add_node(doc, &node_type, name)?;
            if let Some(param) = node.parameter(doc, partition::VARIABLE_NAME_TAG) {
                param.set_value(doc, ParamValue::Name(name.to_string()), ModificationType::Silent)?;
            }
            Ok(node)
        })
    }

    /// Removes `node` with its whole child hierarchy.
    ///
    /// References held by surviving nodes into the removed subtrees are
    /// stripped and LogBook records below them are cleared.
    pub fn delete_node(&mut self, node: &Node) -> ModelResult<()> {
        self.ensure_initialized()?;
        self.ensure_exists(node)?;

        let mut doomed: BTreeSet<Node> = BTreeSet::new();
        let mut stack = vec![node.clone()];
        while let Some(current) = stack.pop() {
            if !self.doc.contains(current.root_label()) || !doomed.insert(current.clone()) {
                continue;
            }
            stack.extend(current.children(&self.doc));
        }
        let roots: Vec<Entry> = doomed.iter().map(|node| node.root_label().clone()).collect();

        let node = node.clone();
        self.doc.atomic(|doc| -> ModelResult<()> {
            if let Some(parent) = node.parent(doc) {
                if doc.contains(parent.root_label()) {
                    parent.remove_child_node(doc, &node)?;
                }
            }
            strip_references(doc, &roots)?;
            let logbook = LogBook::new();
            for root in &roots {
                logbook.clear_references_for(doc, root)?;
            }
            for root in &roots {
                if doc.contains(root) {
                    doc.forget_subtree(root)?;
                }
            }
            Ok(())
        })?;
        info!(
            "event=delete_node module=model status=ok node={} removed={}",
            node.id(),
            roots.len()
        );
        Ok(())
    }

    /// Copies `node` with its child hierarchy into the copy/paste buffer.
    pub fn copy_node(&mut self, node: &Node) -> ModelResult<()> {
        self.ensure_initialized()?;
        self.ensure_exists(node)?;
        copy_paste::copy_to_buffer(self, node)
    }

    /// Pastes the buffer content as a new child of `parent`.
    ///
    /// Returns `None` when the buffer is empty or `parent` is a copied node.
    pub fn paste_as_child(&mut self, parent: &Node) -> ModelResult<Option<Node>> {
        self.ensure_initialized()?;
        self.ensure_exists(parent)?;
        copy_paste::paste_as_child(self, parent)
    }

    pub fn set_copy_suffix(&mut self, option: SuffixOption) {
        self.copy.suffix = option;
    }

    /// Checks every node of every partition against its declared type.
    pub fn check_well_formed(&self) -> bool {
        self.node_types.iter().all(|(type_id, node_type)| {
            Partition::new(*type_id)
                .nodes(&self.doc)
                .iter()
                .all(|node| {
                    let accepted = node_type.accepts(&self.doc, node);
                    if !accepted {
                        warn!(
                            "event=check_well_formed module=model status=malformed node={}",
                            node.id()
                        );
                    }
                    accepted
                })
        })
    }

    fn init_registries(&mut self) {
        self.node_types = self.schema.node_types().into_iter().collect();
        for kind in VariableKind::ALL {
            if self.node_types.insert(kind.type_id(), kind.node_type()).is_some() {
                warn!(
                    "event=init_partitions module=model status=overridden type_id={}",
                    kind.type_id()
                );
            }
        }
        self.registry = FunctionRegistry::new();
        for driver in self.schema.drivers() {
            self.registry.register(driver);
        }
    }

    fn ensure_initialized(&self) -> ModelResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ModelError::NotInitialized)
        }
    }

    fn ensure_exists(&self, node: &Node) -> ModelResult<()> {
        if self.doc.contains(node.root_label()) {
            Ok(())
        } else {
            Err(ModelError::NodeNotFound(node.id()))
        }
    }
}

fn is_partition_entry(entry: &Entry) -> bool {
    entry.tags().get(1) == Some(&STRUCTURE_TAG_PARTITIONS)
}

fn is_doomed(entry: &Entry, roots: &[Entry]) -> bool {
    roots.iter().any(|root| entry.is_same_or_descendant_of(root))
}

/// Removes references into `roots` from every surviving partition label.
fn strip_references(doc: &mut Document, roots: &[Entry]) -> ModelResult<()> {
    let mut single = Vec::new();
    let mut lists = Vec::new();
    for (entry, data) in doc.store().iter() {
        if !is_partition_entry(entry) || is_doomed(entry, roots) {
            continue;
        }
        if let Some(target) = data.get(AttrKind::Reference).and_then(AttrValue::as_reference) {
            if is_doomed(target, roots) {
                single.push(entry.clone());
            }
        }
        if let Some(targets) = data.get(AttrKind::ReferenceList).and_then(AttrValue::as_reference_list) {
            if targets.iter().any(|target| is_doomed(target, roots)) {
                let kept: Vec<Entry> = targets
                    .iter()
                    .filter(|target| !is_doomed(target, roots))
                    .cloned()
                    .collect();
                lists.push((entry.clone(), kept));
            }
        }
    }
    for entry in single {
        doc.remove_attr(&entry, AttrKind::Reference)?;
    }
    for (entry, kept) in lists {
        doc.set_attr(&entry, AttrValue::ReferenceList(kept))?;
    }
    Ok(())
}

/// Resolves replayed entries to parameters and touches the live ones.
/// Touched and Impacted records that exist before a replay.
///
/// Replaying a command rewrites whole LogBook sections, so records written
/// outside that command (by an earlier replay) are put back afterwards for
/// every label that still exists.
struct PendingRecords {
    touched: BTreeSet<Entry>,
    impacted: BTreeSet<Entry>,
}

impl PendingRecords {
    fn capture(doc: &Document) -> Self {
        let logbook = LogBook::new();
        Self {
            touched: logbook.entries(doc, LogBookSection::Touched),
            impacted: logbook.entries(doc, LogBookSection::Impacted),
        }
    }

    fn restore(&self, doc: &mut Document) -> ModelResult<()> {
        let logbook = LogBook::new();
        for label in self.touched.iter() {
            if doc.contains(label) {
                logbook.touch(doc, label)?;
            }
        }
        for label in self.impacted.iter() {
            if doc.contains(label) {
                logbook.impact(doc, label)?;
            }
        }
        Ok(())
    }
}

fn collect_undo_outcome(doc: &mut Document, affected: &BTreeSet<Entry>) -> ModelResult<UndoOutcome> {
    let ids: BTreeSet<Entry> = affected
        .iter()
        .filter(|entry| is_partition_entry(entry))
        .filter_map(|entry| entry.trimmed(PARAM_ENTRY_DEPTH))
        .collect();

    let mut outcome = UndoOutcome::default();
    for id in ids {
        match param_by_child_label_settle(doc, &id) {
            Some((param, is_unknown_type)) if param.root_label() == &id => {
                param.set_touched(doc)?;
                outcome.params.push(ParamRef {
                    id,
                    is_alive: true,
                    is_unknown_type,
                });
            }
            _ => outcome.params.push(ParamRef {
                id,
                is_alive: false,
                is_unknown_type: false,
            }),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{BaseModel, ModelConfig, ModelError, ModelSchema, ModelStatus, NodeType, VariableKind};
    use crate::label::Entry;
    use crate::param::{DataCursor, ModificationType, ParamValue, ParameterKind};
    use crate::tx::{TxData, TxMode};

    struct Shapes;

    impl ModelSchema for Shapes {
        fn node_types(&self) -> Vec<(u32, NodeType)> {
            vec![(1, NodeType::new("Shape").with_param(1, ParameterKind::Real, "Size"))]
        }

        fn actual_version_app(&self) -> i32 {
            1
        }
    }

    fn model() -> BaseModel<Shapes> {
        let mut model = BaseModel::new(Shapes, ModelConfig::default());
        model.new_empty().expect("new empty model");
        model
    }

    #[test]
    fn structure_operations_need_initialization() {
        let mut model = BaseModel::new(Shapes, ModelConfig::default());
        assert!(model.status().contains(ModelStatus::UNDEFINED));
        assert!(matches!(model.add_node(1, "a"), Err(ModelError::NotInitialized)));
    }

    #[test]
    fn new_empty_registers_schema_and_variable_partitions() {
        let model = model();
        assert!(model.is_initialized());
        assert!(model.partition(1).is_ok());
        assert!(model.partition(VariableKind::Int.type_id()).is_ok());
        assert!(matches!(model.partition(7), Err(ModelError::PartitionNotRegistered(7))));
        assert_eq!(model.nb_undos(), 0);
        assert_eq!(model.stored_version_app(), 1);
    }

    #[test]
    fn extended_mode_rejects_writes_outside_commands() {
        let mut model = model();
        assert!(matches!(
            model.add_node(1, "loose"),
            Err(ModelError::Param(_))
        ));
        assert!(model.partition(1).expect("partition").is_empty(model.document()));
    }

    #[test]
    fn undo_reports_parameters_and_touches_them() {
        let mut model = model();
        model.open_command().expect("open");
        let node = model.add_node(1, "shape").expect("node");
        model.commit_command(TxData::named("create")).expect("commit");

        let size = node.parameter(model.document(), 1).expect("size");
        model.open_command().expect("open");
        size.set_value(model.document_mut(), ParamValue::Real(4.0), ModificationType::Silent)
            .expect("set size");
        model.commit_command(TxData::named("edit")).expect("commit");
        assert!(model.is_modified());
        assert_eq!(
            model.get_modified_nodes().iter().map(|node| node.id()).collect::<Vec<_>>(),
            vec![node.id()]
        );

        let outcome = model.undo(1).expect("undo");
        let ids: Vec<&Entry> = outcome.alive().map(|param| &param.id).collect();
        assert_eq!(ids, vec![size.root_label()]);
        assert_eq!(size.value(model.document()), Some(ParamValue::Real(0.0)));
        assert!(crate::logbook::LogBook::new().is_touched(model.document(), size.root_label()));

        let outcome = model.undo(1).expect("undo creation");
        assert!(outcome.params.iter().all(|param| !param.is_alive));
        assert!(model.find_node(node.root_label()).is_none());
    }

    #[test]
    fn names_resolve_through_parent_chain() {
        let mut model = BaseModel::new(
            Shapes,
            ModelConfig {
                tx_mode: TxMode::Simple,
                ..ModelConfig::default()
            },
        );
        model.new_empty().expect("new empty");
        let root = model.add_node(1, "root").expect("root");
        let mid = model.add_node(1, "mid").expect("mid");
        let leaf = model.add_node(1, "leaf").expect("leaf");
        let stray = model.add_node(1, "leaf").expect("stray leaf");
        model.add_child_node(&root, &mid).expect("link mid");
        model.add_child_node(&mid, &leaf).expect("link leaf");

        assert_eq!(model.find_nodes_by_name("leaf"), vec![leaf.clone(), stray.clone()]);
        assert_eq!(model.find_node_by_names(&["root", "mid", "leaf"]), Some(leaf.clone()));
        assert_eq!(model.find_node_by_names(&["leaf"]), Some(leaf.clone()));
        assert_eq!(model.find_node_by_names(&["other", "leaf"]), None);
        assert_eq!(model.find_node_by_names(&[]), None);
        assert_eq!(model.find_node_by_id(&leaf.id()), Some(leaf));
        assert_eq!(model.find_node_by_id("0:9"), None);
    }

    #[test]
    fn variables_carry_their_name() {
        let mut model = BaseModel::new(
            Shapes,
            ModelConfig {
                tx_mode: TxMode::Simple,
                ..ModelConfig::default()
            },
        );
        model.new_empty().expect("new empty");
        let variable = model.add_variable(VariableKind::Bool, "enabled").expect("variable");
        let doc = model.document();
        assert_eq!(variable.name(doc).as_deref(), Some("enabled"));
        assert_eq!(
            variable.parameter(doc, 1).and_then(|param| param.value(doc)),
            Some(ParamValue::Name("enabled".to_string()))
        );
        assert_eq!(
            variable.parameter(doc, 2).map(|param| param.kind()),
            Some(ParameterKind::Bool)
        );
        assert!(model.check_well_formed());
    }
}
