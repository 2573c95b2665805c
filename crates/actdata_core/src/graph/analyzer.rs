//! Cycle detection over the function dependency graph.
//!
//! # Responsibility
//! - Detect loops with an iterative depth-first walk.
//! - Report cyclic function ids, optionally enriched with everything
//!   reachable from them.
//!
//! # Invariants
//! - Every `detect_loops` call starts from a clean `UNDEFINED` state.
//! - A reported loop is the path slice from the repeated vertex to the top
//!   of the walk stack, so every reported id lies on a real cycle.
//! - Once a loop is found through a path, the walk stops descending the
//!   remaining successors of that vertex.

use super::{DependencyGraph, FunctionId};
use crate::param::tree_function::TreeFunctionParameter;
use bitflags::bitflags;
use log::{debug, warn};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

bitflags! {
    /// Outcome of the last loop detection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GraphState: u32 {
        const UNDEFINED = 0x1;
        const NO_GRAPH = 0x2;
        const OK = 0x4;
        const HAS_LOOPS = 0x8;
    }
}

/// Loop detection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectStrategy {
    #[default]
    Dfs,
    /// Reserved; selecting it is reported as an error.
    Tarjan,
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    NotImplemented(DetectStrategy),
}

impl Display for AnalyzerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotImplemented(strategy) => {
                write!(f, "loop detection strategy {strategy:?} is not yet implemented")
            }
        }
    }
}

impl Error for AnalyzerError {}

pub struct DependencyAnalyzer<'g> {
    graph: &'g DependencyGraph,
    state: GraphState,
    loops: Vec<Vec<FunctionId>>,
}

struct Frame {
    id: FunctionId,
    successors: Vec<FunctionId>,
    cursor: usize,
}

impl<'g> DependencyAnalyzer<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            state: GraphState::UNDEFINED,
            loops: Vec::new(),
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        !self.state.contains(GraphState::UNDEFINED)
    }

    /// Loops found by the last detection, each as a path of vertex ids.
    pub fn loops(&self) -> &[Vec<FunctionId>] {
        &self.loops
    }

    pub fn detect_loops(&mut self, strategy: DetectStrategy) -> AnalyzerResult<GraphState> {
        self.state = GraphState::UNDEFINED;
        self.loops.clear();

        if self.graph.is_empty() {
            self.state = GraphState::NO_GRAPH;
            return Ok(self.state);
        }

        match strategy {
            DetectStrategy::Dfs => self.detect_dfs(),
            DetectStrategy::Tarjan => return Err(AnalyzerError::NotImplemented(strategy)),
        }

        self.state = if self.loops.is_empty() {
            GraphState::OK
        } else {
            GraphState::HAS_LOOPS
        };
        debug!(
            "event=detect_loops module=graph status=ok vertices={} loops={}",
            self.graph.len(),
            self.loops.len()
        );
        Ok(self.state)
    }

    /// Ids lying on at least one detected loop.
    pub fn cyclic_ids(&self) -> BTreeSet<FunctionId> {
        self.loops.iter().flatten().copied().collect()
    }

    /// Cyclic ids closed under successors.
    pub fn enriched_cyclic_ids(&self) -> BTreeSet<FunctionId> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<FunctionId> = self.cyclic_ids().into_iter().collect();
        while let Some(id) = stack.pop() {
            if !closure.insert(id) {
                continue;
            }
            if self.graph.vertex(id).is_none() {
                warn!("event=detect_loops module=graph status=dangling_vertex id={}", id);
                continue;
            }
            stack.extend(self.graph.successors(id).filter(|next| !closure.contains(next)));
        }
        closure
    }

    /// Tree-function parameters behind the cyclic ids.
    pub fn cyclic_parameters(&self, is_enriched: bool) -> Vec<TreeFunctionParameter> {
        let ids = if is_enriched {
            self.enriched_cyclic_ids()
        } else {
            self.cyclic_ids()
        };
        ids.into_iter()
            .filter_map(|id| self.graph.vertex(id))
            .map(|vertex| vertex.function().clone())
            .collect()
    }

    fn detect_dfs(&mut self) {
        // Vertices whose whole reachable subgraph was walked without meeting
        // the current path. They cannot lead to a loop.
        let mut done: HashSet<FunctionId> = HashSet::new();

        for root in self.graph.ids() {
            if done.contains(&root) {
                continue;
            }
            let mut path: Vec<FunctionId> = vec![root];
            let mut frames = vec![self.frame(root)];
            // Per frame: set when the vertex finished early after a loop.
            let mut cut = vec![false];

            while let Some(frame) = frames.last_mut() {
                let Some(next) = frame.successors.get(frame.cursor).copied() else {
                    let finished = frames.pop().map(|frame| frame.id);
                    let was_cut = cut.pop().unwrap_or(false);
                    path.pop();
                    if let Some(id) = finished {
                        if !was_cut {
                            done.insert(id);
                        }
                    }
                    continue;
                };
                frame.cursor += 1;

                if let Some(position) = path.iter().position(|id| *id == next) {
                    self.loops.push(path[position..].to_vec());
                    let skip_to = frame.successors.len();
                    frame.cursor = skip_to;
                    // The cut taints every vertex on the path.
                    for flag in cut.iter_mut() {
                        *flag = true;
                    }
                    continue;
                }
                if done.contains(&next) {
                    continue;
                }
                path.push(next);
                frames.push(self.frame(next));
                cut.push(false);
            }
        }
    }

    fn frame(&self, id: FunctionId) -> Frame {
        Frame {
            id,
            successors: self.graph.successors(id).collect(),
            cursor: 0,
        }
    }
}
