//! Node cursors and node type declarations.
//!
//! # Responsibility
//! - Lay out a node below its partition: a meta section with the type name,
//!   user flags, name and tree links, plus the declared user parameters.
//! - Maintain the parent reference and the children list of the node tree.
//!
//! # Invariants
//! - A node root is `0:2:<type id>:<n>`; its parameters are six-tag labels.
//! - Parent and children links are kept symmetric by `add_child_node` and
//!   `remove_child_node`.
//! - The type name is written once by `expand` and never changes.

use crate::document::Document;
use crate::label::Entry;
use crate::param::factory::user_parameter;
use crate::param::{DataCursor, DetachedParameter, ModificationType, ParamResult, ParamValue, Parameter, ParameterKind};

/// Child tag of the meta section below a node root.
pub const META_TAG: u32 = 1;
/// Child tag of the user parameter section below a node root.
pub const PARAMS_TAG: u32 = 2;

/// Slot tags of the meta section.
pub mod meta {
    pub const TYPE_NAME: u32 = 1;
    pub const USER_FLAGS: u32 = 2;
    pub const NAME: u32 = 3;
    pub const PARENT: u32 = 4;
    pub const CHILDREN: u32 = 5;
}

const META_SLOTS: [(u32, ParameterKind); 5] = [
    (meta::TYPE_NAME, ParameterKind::AsciiString),
    (meta::USER_FLAGS, ParameterKind::Int),
    (meta::NAME, ParameterKind::Name),
    (meta::PARENT, ParameterKind::Reference),
    (meta::CHILDREN, ParameterKind::ReferenceList),
];

/// One declared user parameter of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlot {
    pub tag: u32,
    pub kind: ParameterKind,
    pub name: &'static str,
}

/// Shape of the nodes stored in one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeType {
    pub type_name: &'static str,
    pub params: Vec<ParamSlot>,
}

impl NodeType {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, tag: u32, kind: ParameterKind, name: &'static str) -> Self {
        self.params.push(ParamSlot { tag, kind, name });
        self
    }

    pub fn slot(&self, tag: u32) -> Option<&ParamSlot> {
        self.params.iter().find(|slot| slot.tag == tag)
    }

    /// True when `node` carries this type name and every declared slot is a
    /// well-formed parameter of the declared kind.
    pub fn accepts(&self, doc: &Document, node: &Node) -> bool {
        if !node.is_well_formed(doc) {
            return false;
        }
        if node.type_name(doc).as_deref() != Some(self.type_name) {
            return false;
        }
        self.params.iter().all(|slot| {
            node.parameter(doc, slot.tag)
                .is_some_and(|param| param.kind() == slot.kind && param.is_well_formed(doc))
        })
    }
}

/// Cursor over a node root label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node {
    root: Entry,
}

impl DataCursor for Node {
    fn root_label(&self) -> &Entry {
        &self.root
    }

    fn is_well_formed(&self, doc: &Document) -> bool {
        doc.contains(&self.root)
            && META_SLOTS
                .iter()
                .all(|(tag, kind)| self.meta(*tag, *kind).is_well_formed(doc))
    }
}

impl Node {
    /// Binds a cursor to `root` without touching persistent data.
    pub fn settle_on(root: Entry) -> Self {
        Self { root }
    }

    /// Data object id: the entry string of the root label.
    pub fn id(&self) -> String {
        self.root.to_string()
    }

    /// Type id of the owning partition.
    pub fn type_id(&self) -> Option<u32> {
        self.root.tags().get(2).copied()
    }

    pub fn type_name(&self, doc: &Document) -> Option<String> {
        match self.meta(meta::TYPE_NAME, ParameterKind::AsciiString).value(doc)? {
            ParamValue::AsciiString(name) => Some(name),
            _ => None,
        }
    }

    pub fn name(&self, doc: &Document) -> Option<String> {
        match self.meta(meta::NAME, ParameterKind::Name).value(doc)? {
            ParamValue::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn set_name(&self, doc: &mut Document, name: &str) -> ParamResult<()> {
        self.meta(meta::NAME, ParameterKind::Name).set_value(
            doc,
            ParamValue::Name(name.to_string()),
            ModificationType::Touched,
        )
    }

    pub fn user_flags(&self, doc: &Document) -> i32 {
        self.meta(meta::USER_FLAGS, ParameterKind::Int)
            .value(doc)
            .and_then(|value| value.as_int())
            .unwrap_or(0)
    }

    pub fn set_user_flags(&self, doc: &mut Document, flags: i32) -> ParamResult<()> {
        self.meta(meta::USER_FLAGS, ParameterKind::Int)
            .set_value(doc, ParamValue::Int(flags), ModificationType::Silent)
    }

    pub fn parent(&self, doc: &Document) -> Option<Node> {
        match self.meta(meta::PARENT, ParameterKind::Reference).value(doc)? {
            ParamValue::Reference(target) => Some(Node::settle_on(target)),
            _ => None,
        }
    }

    /// Child nodes in insertion order.
    pub fn children(&self, doc: &Document) -> Vec<Node> {
        self.child_entries(doc).into_iter().map(Node::settle_on).collect()
    }

    /// User parameter at `tag` of the parameter section.
    pub fn parameter(&self, doc: &Document, tag: u32) -> Option<Parameter> {
        user_parameter(doc, &self.params_root().child(tag)).map(|(param, _)| param)
    }

    /// Every user parameter of the node, in tag order.
    pub fn parameters(&self, doc: &Document) -> Vec<Parameter> {
        doc.children(&self.params_root())
            .iter()
            .filter_map(|label| user_parameter(doc, label).map(|(param, _)| param))
            .collect()
    }

    /// Appends `child` to the children list and points its parent link here.
    pub fn add_child_node(&self, doc: &mut Document, child: &Node) -> ParamResult<()> {
        let mut children = self.child_entries(doc);
        if children.contains(&child.root) {
            return Ok(());
        }
        children.push(child.root.clone());
        doc.atomic(|doc| -> ParamResult<()> {
            self.meta(meta::CHILDREN, ParameterKind::ReferenceList).set_value(
                doc,
                ParamValue::ReferenceList(children),
                ModificationType::Impacted,
            )?;
            child.meta(meta::PARENT, ParameterKind::Reference).set_value(
                doc,
                ParamValue::Reference(self.root.clone()),
                ModificationType::Silent,
            )
        })
    }

    /// Drops `child` from the children list. Returns `false` when it was not
    /// a child of this node.
    pub fn remove_child_node(&self, doc: &mut Document, child: &Node) -> ParamResult<bool> {
        let mut children = self.child_entries(doc);
        let before = children.len();
        children.retain(|entry| *entry != child.root);
        if children.len() == before {
            return Ok(false);
        }
        doc.atomic(|doc| -> ParamResult<bool> {
            self.meta(meta::CHILDREN, ParameterKind::ReferenceList).set_value(
                doc,
                ParamValue::ReferenceList(children),
                ModificationType::Impacted,
            )?;
            if child.parent(doc).as_ref() == Some(self) && doc.contains(&child.root) {
                child.reset_parent(doc)?;
            }
            Ok(true)
        })
    }

    /// Creates the meta section and the declared parameters under `root`.
    pub(crate) fn expand(doc: &mut Document, root: Entry, node_type: &NodeType, name: &str) -> ParamResult<Node> {
        let node = Node::settle_on(root);
        doc.atomic(|doc| -> ParamResult<()> {
            doc.ensure_label(&node.root)?;
            for (tag, kind) in META_SLOTS {
                DetachedParameter::new(kind).expand_on(doc, node.meta_label(tag))?;
            }
            node.meta(meta::TYPE_NAME, ParameterKind::AsciiString).set_value(
                doc,
                ParamValue::AsciiString(node_type.type_name.to_string()),
                ModificationType::Silent,
            )?;
            node.meta(meta::NAME, ParameterKind::Name).set_value(
                doc,
                ParamValue::Name(name.to_string()),
                ModificationType::Silent,
            )?;
            for slot in &node_type.params {
                let param = DetachedParameter::new(slot.kind).expand_on(doc, node.params_root().child(slot.tag))?;
                param.set_name(doc, slot.name, ModificationType::Silent)?;
            }
            Ok(())
        })?;
        Ok(node)
    }

    pub(crate) fn reset_parent(&self, doc: &mut Document) -> ParamResult<()> {
        self.meta(meta::PARENT, ParameterKind::Reference)
            .reset_value(doc, ModificationType::Silent)
    }

    pub(crate) fn child_entries(&self, doc: &Document) -> Vec<Entry> {
        match self.meta(meta::CHILDREN, ParameterKind::ReferenceList).value(doc) {
            Some(ParamValue::ReferenceList(entries)) => entries,
            _ => Vec::new(),
        }
    }

    pub(crate) fn meta(&self, tag: u32, kind: ParameterKind) -> Parameter {
        DetachedParameter::new(kind).settle_on(self.meta_label(tag))
    }

    fn meta_label(&self, tag: u32) -> Entry {
        self.root.child(META_TAG).child(tag)
    }

    fn params_root(&self) -> Entry {
        self.root.child(PARAMS_TAG)
    }
}
