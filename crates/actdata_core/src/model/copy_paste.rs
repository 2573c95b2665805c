//! Copy/paste engine working through the buffer section `0:3`.
//!
//! # Responsibility
//! - Flatten a node and its child hierarchy into the buffer, one buffered
//!   node per copied node.
//! - Keep references inside the copied scope and drop the others.
//! - Restore buffered nodes into their partitions as a new child subtree.
//!
//! # Invariants
//! - Buffered nodes live at `0:3:1:<k>`; the copied root is always `k = 1`.
//! - Buffered tree functions never carry the graph-node marker, so the
//!   dependency graph ignores the buffer.
//! - A tree function with an argument or result outside the copied scope is
//!   disconnected; its driver is kept.

use super::node::{meta, Node};
use super::partition::Partition;
use super::{ModelInternals, ModelParts, ModelResult, NODE_ENTRY_DEPTH};
use crate::document::{DocResult, Document};
use crate::label::{AttrKind, AttrValue, Entry};
use crate::param::factory::new_parameter_settle;
use crate::param::tree_function::{ARGUMENTS_TAG, RESULTS_TAG};
use crate::param::{DataCursor, ModificationType, ParamValue, ParameterKind};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Structure tag of the copy/paste section.
pub const STRUCTURE_TAG_COPY_PASTE: u32 = 3;
/// Child tag of the buffer head below the section.
pub const BUFFER_HEAD_TAG: u32 = 1;
/// Suffix appended to the names of pasted nodes.
pub const COPY_SUFFIX: &str = " [copy]";

/// Which pasted nodes get [`COPY_SUFFIX`] appended to their name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixOption {
    None,
    Root,
    #[default]
    All,
}

/// Copy bookkeeping of one model.
#[derive(Debug, Default)]
pub(crate) struct CopyState {
    /// Copied node root to buffered node root.
    pub(crate) relocation: BTreeMap<Entry, Entry>,
    pub(crate) suffix: SuffixOption,
}

impl CopyState {
    pub(crate) fn is_source(&self, entry: &Entry) -> bool {
        self.relocation.contains_key(entry)
    }

    pub(crate) fn clear(&mut self) {
        self.relocation.clear();
    }
}

pub fn buffer_root() -> Entry {
    Entry::from_root(&[STRUCTURE_TAG_COPY_PASTE, BUFFER_HEAD_TAG])
}

/// Removes every buffered node.
pub(crate) fn release_buffer(doc: &mut Document) -> DocResult<()> {
    let head = buffer_root();
    doc.ensure_label(&head)?;
    for buffered in doc.children(&head) {
        doc.forget_subtree(&buffered)?;
    }
    Ok(())
}

pub(crate) fn copy_to_buffer(model: &mut impl ModelInternals, node: &Node) -> ModelResult<()> {
    let ModelParts { doc, copy, .. } = model.parts();

    let mut order: Vec<Entry> = Vec::new();
    let mut seen: BTreeSet<Entry> = BTreeSet::new();
    let mut queue = VecDeque::from([node.clone()]);
    while let Some(current) = queue.pop_front() {
        let root = current.root_label().clone();
        if !doc.contains(&root) || !seen.insert(root.clone()) {
            continue;
        }
        queue.extend(current.children(doc));
        order.push(root);
    }

    let head = buffer_root();
    let relocation: Vec<(Entry, Entry)> = order
        .into_iter()
        .zip(1u32..)
        .map(|(source, k)| (source, head.child(k)))
        .collect();
    let table: BTreeMap<Entry, Entry> = relocation.iter().cloned().collect();

    doc.atomic(|doc| -> ModelResult<()> {
        release_buffer(doc)?;
        for (source, target) in &relocation {
            copy_label_tree(doc, source, target)?;
        }
        normalize(doc, &table)?;
        Ok(())
    })?;

    info!(
        "event=copy_node module=model status=ok node={} buffered={}",
        node.id(),
        table.len()
    );
    copy.relocation = table;
    Ok(())
}

pub(crate) fn paste_as_child(model: &mut impl ModelInternals, parent: &Node) -> ModelResult<Option<Node>> {
    let ModelParts {
        doc,
        node_types,
        copy,
    } = model.parts();

    if copy.is_source(parent.root_label()) {
        warn!(
            "event=paste_node module=model status=refused reason=target_is_copied parent={}",
            parent.id()
        );
        return Ok(None);
    }

    let buffered = doc.children(&buffer_root());
    if buffered.is_empty() {
        return Ok(None);
    }

    let mut plan: Vec<(Entry, u32)> = Vec::with_capacity(buffered.len());
    for entry in buffered {
        let type_name = Node::settle_on(entry.clone()).type_name(doc);
        let type_id = type_name.as_deref().and_then(|name| {
            node_types
                .iter()
                .find(|(_, node_type)| node_type.type_name == name)
                .map(|(type_id, _)| *type_id)
        });
        let Some(type_id) = type_id else {
            warn!(
                "event=paste_node module=model status=refused reason=malformed_buffer entry={}",
                entry
            );
            return Ok(None);
        };
        plan.push((entry, type_id));
    }

    let suffix = copy.suffix;
    let pasted = doc.atomic(|doc| -> ModelResult<Node> {
        let mut relocation: Vec<(Entry, Entry)> = Vec::with_capacity(plan.len());
        for (buffered, type_id) in &plan {
            let target = doc.new_child(Partition::new(*type_id).root())?;
            relocation.push((buffered.clone(), target));
        }
        for (buffered, target) in &relocation {
            copy_label_tree(doc, buffered, target)?;
        }
        let table: BTreeMap<Entry, Entry> = relocation.iter().cloned().collect();
        normalize(doc, &table)?;
        reconnect_functions(doc, relocation.iter().map(|(_, target)| target))?;

        for (position, (_, target)) in relocation.iter().enumerate() {
            let needs_suffix = match suffix {
                SuffixOption::None => false,
                SuffixOption::Root => position == 0,
                SuffixOption::All => true,
            };
            if needs_suffix {
                let node = Node::settle_on(target.clone());
                let name = node.name(doc).unwrap_or_default();
                node.meta(meta::NAME, ParameterKind::Name).set_value(
                    doc,
                    ParamValue::Name(format!("{name}{COPY_SUFFIX}")),
                    ModificationType::Silent,
                )?;
            }
        }

        let root = relocation
            .first()
            .map(|(_, target)| Node::settle_on(target.clone()))
            .ok_or_else(|| super::ModelError::NodeNotFound(buffer_root().child(1).to_string()))?;
        parent.add_child_node(doc, &root)?;
        Ok(root)
    })?;

    info!(
        "event=paste_node module=model status=ok parent={} root={}",
        parent.id(),
        pasted.id()
    );
    Ok(Some(pasted))
}

/// Copies every label of the `from` subtree below `to`, without graph-node
/// markers.
fn copy_label_tree(doc: &mut Document, from: &Entry, to: &Entry) -> DocResult<()> {
    for label in doc.subtree(from) {
        let Some(target) = label.relocated(from, to) else {
            continue;
        };
        let attrs: Vec<AttrValue> = doc
            .store()
            .label(&label)
            .map(|data| data.iter().cloned().collect())
            .unwrap_or_default();
        doc.ensure_label(&target)?;
        for attr in attrs {
            if attr.kind() == AttrKind::GraphNode {
                continue;
            }
            doc.set_attr(&target, attr)?;
        }
    }
    Ok(())
}

/// Rewrites the references held by the nodes in `table` values.
///
/// A target inside a copied node moves to the matching new node. Other
/// single references are reset and other list items dropped, except for
/// tree-function lists, whose function is disconnected instead.
fn normalize(doc: &mut Document, table: &BTreeMap<Entry, Entry>) -> ModelResult<()> {
    let relocate = |target: &Entry| -> Option<Entry> {
        let node = target.trimmed(NODE_ENTRY_DEPTH)?;
        let to = table.get(&node)?;
        target.relocated(&node, to)
    };

    let mut resets: Vec<Entry> = Vec::new();
    let mut writes: Vec<(Entry, AttrValue)> = Vec::new();
    let mut broken_functions: BTreeSet<Entry> = BTreeSet::new();

    for root in table.values() {
        for label in doc.subtree(root) {
            let Some(data) = doc.store().label(&label) else {
                continue;
            };
            if let Some(target) = data.get(AttrKind::Reference).and_then(AttrValue::as_reference) {
                match relocate(target) {
                    Some(moved) => writes.push((label.clone(), AttrValue::Reference(moved))),
                    None => resets.push(label.clone()),
                }
            }
            let Some(targets) = data
                .get(AttrKind::ReferenceList)
                .and_then(AttrValue::as_reference_list)
            else {
                continue;
            };
            let moved: Vec<Option<Entry>> = targets.iter().map(|target| relocate(target)).collect();
            let function = function_of_list(doc, &label);
            match function {
                Some(function) if moved.iter().any(Option::is_none) => {
                    broken_functions.insert(function);
                }
                _ => writes.push((
                    label.clone(),
                    AttrValue::ReferenceList(moved.into_iter().flatten().collect()),
                )),
            }
        }
    }

    for label in resets {
        doc.remove_attr(&label, AttrKind::Reference)?;
    }
    for (label, value) in writes {
        doc.set_attr(&label, value)?;
    }
    for label in broken_functions {
        let Some(function) = new_parameter_settle(doc, &label).and_then(|(param, _)| param.as_tree_function())
        else {
            continue;
        };
        warn!(
            "event=copy_node module=model status=disconnected reason=out_of_scope function={}",
            label
        );
        function.disconnect(doc, false)?;
    }
    Ok(())
}

/// Tree-function label owning `label` when it is an argument or result list.
fn function_of_list(doc: &Document, label: &Entry) -> Option<Entry> {
    if label.tag() != ARGUMENTS_TAG && label.tag() != RESULTS_TAG {
        return None;
    }
    let father = label.father()?;
    doc.attr(&father, AttrKind::Driver).map(|_| father)
}

/// Puts the graph-node marker back on pasted functions that kept their lists.
fn reconnect_functions<'e>(doc: &mut Document, roots: impl Iterator<Item = &'e Entry>) -> DocResult<()> {
    let mut functions = Vec::new();
    for root in roots {
        for label in doc.subtree(root) {
            if doc.attr(&label, AttrKind::Driver).is_some()
                && doc
                    .attr(&label.child(ARGUMENTS_TAG), AttrKind::ReferenceList)
                    .is_some()
            {
                functions.push(label);
            }
        }
    }
    for label in functions {
        doc.set_attr(&label, AttrValue::GraphNode)?;
    }
    Ok(())
}
