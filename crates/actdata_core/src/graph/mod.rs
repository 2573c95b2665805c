//! Function-level dependency graph derived from the document.
//!
//! # Responsibility
//! - Collect the connected tree-function parameters of a document.
//! - Derive producer/consumer edges from their result and argument lists.
//!
//! # Invariants
//! - Vertex ids are assigned from 1 in label order, so a rebuild over an
//!   unchanged document reproduces the same ids.
//! - There is an edge F -> G iff some result of F is an argument of G.
//! - The graph is a derived cache; it never writes to the document.

pub mod analyzer;
pub mod iterator;

pub use analyzer::{AnalyzerError, AnalyzerResult, DependencyAnalyzer, DetectStrategy, GraphState};
pub use iterator::{DependencyGraphIterator, SequentialFuncIterator};

use crate::document::Document;
use crate::label::{AttrKind, Entry};
use crate::param::factory::new_parameter_settle;
use crate::param::tree_function::TreeFunctionParameter;
use crate::param::DataCursor;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Integer id of a graph vertex.
pub type FunctionId = usize;

/// One tree function in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    id: FunctionId,
    function: TreeFunctionParameter,
    next: BTreeSet<FunctionId>,
    prev: BTreeSet<FunctionId>,
}

impl Vertex {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn function(&self) -> &TreeFunctionParameter {
        &self.function
    }

    pub fn label(&self) -> &Entry {
        self.function.root_label()
    }

    pub fn successors(&self) -> &BTreeSet<FunctionId> {
        &self.next
    }

    pub fn predecessors(&self) -> &BTreeSet<FunctionId> {
        &self.prev
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    vertices: BTreeMap<FunctionId, Vertex>,
    by_label: HashMap<Entry, FunctionId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `doc` for connected tree functions and wires their edges.
    pub fn build(doc: &Document) -> Self {
        let mut graph = Self::new();
        let candidates: Vec<Entry> = doc
            .store()
            .iter()
            .filter(|(_, data)| data.get(AttrKind::Driver).is_some())
            .map(|(entry, _)| entry.clone())
            .collect();

        for label in candidates {
            let Some(function) = new_parameter_settle(doc, &label)
                .and_then(|(param, _)| param.as_tree_function())
            else {
                continue;
            };
            if function.is_connected(doc) {
                graph.add_vertex(function);
            }
        }

        let mut producers: HashMap<Entry, Vec<FunctionId>> = HashMap::new();
        for vertex in graph.vertices.values() {
            for result in vertex.function.result_labels(doc) {
                producers.entry(result).or_default().push(vertex.id);
            }
        }

        let mut edges = Vec::new();
        for vertex in graph.vertices.values() {
            for argument in vertex.function.argument_labels(doc) {
                if let Some(sources) = producers.get(&argument) {
                    edges.extend(sources.iter().map(|source| (*source, vertex.id)));
                }
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    /// Adds a vertex for `function` unless it is already present.
    pub fn add_vertex(&mut self, function: TreeFunctionParameter) -> FunctionId {
        if let Some(id) = self.by_label.get(function.root_label()) {
            return *id;
        }
        let id = self.vertices.len() + 1;
        self.by_label.insert(function.root_label().clone(), id);
        self.vertices.insert(
            id,
            Vertex {
                id,
                function,
                next: BTreeSet::new(),
                prev: BTreeSet::new(),
            },
        );
        id
    }

    /// Adds `from -> to`. Unknown ids are ignored.
    pub fn add_edge(&mut self, from: FunctionId, to: FunctionId) {
        if !self.vertices.contains_key(&from) || !self.vertices.contains_key(&to) {
            return;
        }
        if let Some(vertex) = self.vertices.get_mut(&from) {
            vertex.next.insert(to);
        }
        if let Some(vertex) = self.vertices.get_mut(&to) {
            vertex.prev.insert(from);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, id: FunctionId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn vertex_by_label(&self, label: &Entry) -> Option<&Vertex> {
        self.by_label
            .get(label)
            .and_then(|id| self.vertices.get(id))
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.vertices.keys().copied()
    }

    /// Successor ids; empty for unknown vertices.
    pub fn successors(&self, id: FunctionId) -> impl Iterator<Item = FunctionId> + '_ {
        self.vertices
            .get(&id)
            .into_iter()
            .flat_map(|vertex| vertex.next.iter().copied())
    }

    pub fn predecessors(&self, id: FunctionId) -> impl Iterator<Item = FunctionId> + '_ {
        self.vertices
            .get(&id)
            .into_iter()
            .flat_map(|vertex| vertex.prev.iter().copied())
    }
}
