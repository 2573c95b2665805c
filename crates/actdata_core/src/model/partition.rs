//! Partitions: typed node collections below `0:2`.

use super::node::{Node, NodeType};
use crate::document::{DocResult, Document};
use crate::label::Entry;
use crate::param::{ParamResult, ParameterKind};

/// Structure tag of the partition section.
pub const STRUCTURE_TAG_PARTITIONS: u32 = 2;

/// Type ids reserved for the variable partitions.
pub const VARIABLE_BOOL_TYPE_ID: u32 = 901;
pub const VARIABLE_INT_TYPE_ID: u32 = 902;
pub const VARIABLE_REAL_TYPE_ID: u32 = 903;

/// Slot tags of a variable node.
pub const VARIABLE_NAME_TAG: u32 = 1;
pub const VARIABLE_VALUE_TAG: u32 = 2;

/// Ordered collection of the nodes of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    type_id: u32,
    root: Entry,
}

impl Partition {
    pub fn new(type_id: u32) -> Self {
        Self {
            type_id,
            root: Entry::from_root(&[STRUCTURE_TAG_PARTITIONS, type_id]),
        }
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn root(&self) -> &Entry {
        &self.root
    }

    /// Nodes in persistent order.
    pub fn nodes(&self, doc: &Document) -> Vec<Node> {
        doc.children(&self.root)
            .into_iter()
            .map(Node::settle_on)
            .collect()
    }

    pub fn len(&self, doc: &Document) -> usize {
        doc.children(&self.root).len()
    }

    pub fn is_empty(&self, doc: &Document) -> bool {
        self.len(doc) == 0
    }

    /// Appends a new node of `node_type` right after the last one.
    pub fn add_node(&self, doc: &mut Document, node_type: &NodeType, name: &str) -> ParamResult<Node> {
        doc.atomic(|doc| -> ParamResult<Node> {
            let root = doc.new_child(&self.root)?;
            Node::expand(doc, root, node_type, name)
        })
    }

    pub(crate) fn init(&self, doc: &mut Document) -> DocResult<()> {
        doc.ensure_label(&self.root)
    }
}

/// Value kind of a variable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Bool,
    Int,
    Real,
}

impl VariableKind {
    pub const ALL: [VariableKind; 3] = [Self::Bool, Self::Int, Self::Real];

    pub fn type_id(self) -> u32 {
        match self {
            Self::Bool => VARIABLE_BOOL_TYPE_ID,
            Self::Int => VARIABLE_INT_TYPE_ID,
            Self::Real => VARIABLE_REAL_TYPE_ID,
        }
    }

    pub fn parameter_kind(self) -> ParameterKind {
        match self {
            Self::Bool => ParameterKind::Bool,
            Self::Int => ParameterKind::Int,
            Self::Real => ParameterKind::Real,
        }
    }

    pub fn node_type(self) -> NodeType {
        let type_name = match self {
            Self::Bool => "VariableBool",
            Self::Int => "VariableInt",
            Self::Real => "VariableReal",
        };
        NodeType::new(type_name)
            .with_param(VARIABLE_NAME_TAG, ParameterKind::Name, "Name")
            .with_param(VARIABLE_VALUE_TAG, self.parameter_kind(), "Value")
    }
}
