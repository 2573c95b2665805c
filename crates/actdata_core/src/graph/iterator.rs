use super::{DependencyGraph, FunctionId, Vertex};
use log::warn;
use std::collections::{HashMap, HashSet, VecDeque};

/// Breadth-first walk from one vertex over successors, or predecessors when
/// reversed. The root comes first and every vertex is yielded once.
pub struct DependencyGraphIterator<'g> {
    graph: &'g DependencyGraph,
    queue: VecDeque<FunctionId>,
    visited: HashSet<FunctionId>,
    reversed: bool,
}

impl<'g> DependencyGraphIterator<'g> {
    pub fn new(graph: &'g DependencyGraph, root: FunctionId, reversed: bool) -> Self {
        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();
        if graph.vertex(root).is_some() {
            queue.push_back(root);
            visited.insert(root);
        }
        Self {
            graph,
            queue,
            visited,
            reversed,
        }
    }
}

impl<'g> Iterator for DependencyGraphIterator<'g> {
    type Item = &'g Vertex;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        let neighbours: Vec<FunctionId> = if self.reversed {
            self.graph.predecessors(id).collect()
        } else {
            self.graph.successors(id).collect()
        };
        for neighbour in neighbours {
            if self.visited.insert(neighbour) {
                self.queue.push_back(neighbour);
            }
        }
        self.graph.vertex(id)
    }
}

/// Execution order as levels: a vertex appears one level after the last of
/// its predecessors. Inside a level, higher priority comes first, then the
/// lower id.
pub struct SequentialFuncIterator<'g> {
    graph: &'g DependencyGraph,
    levels: VecDeque<Vec<FunctionId>>,
}

impl<'g> SequentialFuncIterator<'g> {
    pub fn new(graph: &'g DependencyGraph, priority: impl Fn(&Vertex) -> i32) -> Self {
        let mut in_degree: HashMap<FunctionId, usize> = graph
            .vertices()
            .map(|vertex| (vertex.id(), vertex.predecessors().len()))
            .collect();

        let mut levels = VecDeque::new();
        let mut current: Vec<FunctionId> = graph
            .vertices()
            .filter(|vertex| vertex.predecessors().is_empty())
            .map(Vertex::id)
            .collect();
        let mut placed = 0usize;

        while !current.is_empty() {
            current.sort_by_key(|id| {
                let rank = graph.vertex(*id).map_or(0, &priority);
                (std::cmp::Reverse(rank), *id)
            });
            let mut next = Vec::new();
            for id in &current {
                for successor in graph.successors(*id) {
                    if let Some(degree) = in_degree.get_mut(&successor) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next.push(successor);
                        }
                    }
                }
            }
            placed += current.len();
            levels.push_back(std::mem::take(&mut current));
            current = next;
        }

        if placed < graph.len() {
            warn!(
                "event=sequential_iterator module=graph status=partial placed={} vertices={}",
                placed,
                graph.len()
            );
        }
        Self { graph, levels }
    }

    /// All vertices in execution order.
    pub fn flatten_order(self) -> Vec<&'g Vertex> {
        let graph = self.graph;
        self.levels
            .into_iter()
            .flatten()
            .filter_map(|id| graph.vertex(id))
            .collect()
    }
}

impl<'g> Iterator for SequentialFuncIterator<'g> {
    type Item = Vec<&'g Vertex>;

    fn next(&mut self) -> Option<Self::Item> {
        let graph = self.graph;
        let level = self.levels.pop_front()?;
        Some(level.into_iter().filter_map(|id| graph.vertex(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyGraphIterator, SequentialFuncIterator};
    use crate::graph::{DependencyGraph, FunctionId, Vertex};
    use crate::label::Entry;
    use crate::param::{DetachedParameter, ParameterKind};

    fn graph(vertex_count: u32, edges: &[(usize, usize)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for node in 1..=vertex_count {
            let function = DetachedParameter::new(ParameterKind::TreeFunction)
                .settle_on(Entry::from_root(&[2, 1, node, 2, 1]))
                .as_tree_function()
                .expect("tree function kind");
            graph.add_vertex(function);
        }
        for (from, to) in edges {
            graph.add_edge(*from, *to);
        }
        graph
    }

    fn ids(vertices: Vec<&Vertex>) -> Vec<FunctionId> {
        vertices.into_iter().map(Vertex::id).collect()
    }

    #[test]
    fn breadth_first_walk_visits_each_vertex_once() {
        let graph = graph(4, &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let forward: Vec<FunctionId> = DependencyGraphIterator::new(&graph, 1, false)
            .map(Vertex::id)
            .collect();
        assert_eq!(forward, vec![1, 2, 3, 4]);

        let backward: Vec<FunctionId> = DependencyGraphIterator::new(&graph, 4, true)
            .map(Vertex::id)
            .collect();
        assert_eq!(backward, vec![4, 2, 3, 1]);
    }

    #[test]
    fn levels_respect_dependencies_and_priority() {
        let graph = graph(4, &[(1, 3), (2, 3), (3, 4)]);
        let mut levels = SequentialFuncIterator::new(&graph, |vertex| {
            if vertex.id() == 2 {
                10
            } else {
                0
            }
        });
        assert_eq!(levels.next().map(ids), Some(vec![2, 1]));
        assert_eq!(levels.next().map(ids), Some(vec![3]));
        assert_eq!(levels.next().map(ids), Some(vec![4]));
        assert!(levels.next().is_none());
    }

    #[test]
    fn flattened_order_of_a_chain() {
        let graph = graph(3, &[(2, 3), (1, 2)]);
        let order = ids(SequentialFuncIterator::new(&graph, |_| 0).flatten_order());
        assert_eq!(order, vec![1, 2, 3]);
    }
}
