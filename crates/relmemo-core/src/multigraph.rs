//! # Deterministic Directed Multigraph
//!
//! A directed graph with first-class parallel edges and fully deterministic
//! iteration: nodes, edges, successors, and incident edge sets all come back in
//! first-insertion order, and stay in that order across removals. Built for
//! reference dependency structure, where two expressions of one reference
//! reading the same child produce genuinely parallel edges.
//!
//! Edge values are identities, not weights: an edge value is globally unique
//! within the graph. Re-adding an existing edge between its existing endpoints
//! is a no-op returning `false`; re-adding it between *different* endpoints is a
//! contract violation, because it would silently rewire the graph. Self-loops
//! are rejected outright.

use crate::error::{MemoError, Result};
use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

#[derive(Debug)]
struct NodeConnections<E> {
    in_edges: IndexSet<E>,
    out_edges: IndexSet<E>,
}

impl<E> NodeConnections<E> {
    fn new() -> Self {
        Self {
            in_edges: IndexSet::new(),
            out_edges: IndexSet::new(),
        }
    }
}

/// Directed multigraph with stable insertion-order iteration.
#[derive(Debug)]
pub struct StableMultigraph<N, E> {
    nodes: IndexMap<N, NodeConnections<E>>,
    edges: IndexMap<E, (N, N)>,
}

impl<N, E> StableMultigraph<N, E>
where
    N: Hash + Eq + Clone + std::fmt::Debug,
    E: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
        }
    }

    /// Add a node. Returns whether the node was new.
    pub fn add_node(&mut self, node: N) -> bool {
        match self.nodes.entry(node) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(NodeConnections::new());
                true
            }
        }
    }

    /// Add a directed edge from `source` to `target`, creating missing
    /// endpoints. Returns `false` if this exact edge already connects these
    /// exact endpoints. Fails if the edge value already connects different
    /// endpoints, or if `source == target`.
    pub fn add_edge(&mut self, source: N, target: N, edge: E) -> Result<bool> {
        if source == target {
            return Err(MemoError::contract(format!(
                "self-loop on node {source:?} is not allowed"
            )));
        }
        if let Some((existing_source, existing_target)) = self.edges.get(&edge) {
            if *existing_source == source && *existing_target == target {
                return Ok(false);
            }
            return Err(MemoError::contract(
                "edge value already connects different endpoints",
            ));
        }
        self.add_node(source.clone());
        self.add_node(target.clone());
        self.nodes[&source].out_edges.insert(edge.clone());
        self.nodes[&target].in_edges.insert(edge.clone());
        self.edges.insert(edge, (source, target));
        Ok(true)
    }

    /// Remove an edge. Returns whether it was present. Iteration order of the
    /// surviving edges is unchanged.
    pub fn remove_edge(&mut self, edge: &E) -> bool {
        let Some((source, target)) = self.edges.shift_remove(edge) else {
            return false;
        };
        self.nodes[&source].out_edges.shift_remove(edge);
        self.nodes[&target].in_edges.shift_remove(edge);
        true
    }

    /// Remove a node and every edge incident to it. Returns whether the node
    /// was present.
    pub fn remove_node(&mut self, node: &N) -> bool {
        let Some(connections) = self.nodes.shift_remove(node) else {
            return false;
        };
        for edge in connections
            .out_edges
            .iter()
            .chain(connections.in_edges.iter())
        {
            if let Some((source, target)) = self.edges.shift_remove(edge) {
                if source != *node {
                    self.nodes[&source].out_edges.shift_remove(edge);
                }
                if target != *node {
                    self.nodes[&target].in_edges.shift_remove(edge);
                }
            }
        }
        true
    }

    pub fn contains_node(&self, node: &N) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn contains_edge(&self, edge: &E) -> bool {
        self.edges.contains_key(edge)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes in first-insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.nodes.keys()
    }

    /// Edges in first-insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &E> {
        self.edges.keys()
    }

    /// The (source, target) pair of an edge.
    pub fn incident_nodes(&self, edge: &E) -> Option<(&N, &N)> {
        self.edges.get(edge).map(|(s, t)| (s, t))
    }

    /// Outgoing edges of a node, in first-insertion order.
    pub fn out_edges(&self, node: &N) -> impl Iterator<Item = &E> {
        self.nodes
            .get(node)
            .into_iter()
            .flat_map(|c| c.out_edges.iter())
    }

    /// Incoming edges of a node, in first-insertion order.
    pub fn in_edges(&self, node: &N) -> impl Iterator<Item = &E> {
        self.nodes
            .get(node)
            .into_iter()
            .flat_map(|c| c.in_edges.iter())
    }

    /// Edges from `source` to `target`, in insertion order. Empty when either
    /// node is absent.
    pub fn edges_connecting(&self, source: &N, target: &N) -> Vec<&E> {
        self.out_edges(source)
            .filter(|edge| {
                self.edges
                    .get(*edge)
                    .map_or(false, |(_, t)| t == target)
            })
            .collect()
    }

    pub fn has_edge_connecting(&self, source: &N, target: &N) -> bool {
        !self.edges_connecting(source, target).is_empty()
    }

    /// Number of outgoing edges, parallel edges counted individually.
    pub fn out_degree(&self, node: &N) -> usize {
        self.nodes.get(node).map_or(0, |c| c.out_edges.len())
    }

    /// Number of incoming edges, parallel edges counted individually.
    pub fn in_degree(&self, node: &N) -> usize {
        self.nodes.get(node).map_or(0, |c| c.in_edges.len())
    }

    pub fn degree(&self, node: &N) -> usize {
        self.out_degree(node) + self.in_degree(node)
    }

    /// Distinct successor nodes, in the order their first connecting edge was
    /// inserted. Parallel edges contribute one successor.
    pub fn successors(&self, node: &N) -> Vec<&N> {
        let mut result: IndexSet<&N> = IndexSet::new();
        for edge in self.out_edges(node) {
            if let Some((_, target)) = self.edges.get(edge) {
                result.insert(target);
            }
        }
        result.into_iter().collect()
    }

    /// Distinct predecessor nodes, in first-connecting-edge order.
    pub fn predecessors(&self, node: &N) -> Vec<&N> {
        let mut result: IndexSet<&N> = IndexSet::new();
        for edge in self.in_edges(node) {
            if let Some((source, _)) = self.edges.get(edge) {
                result.insert(source);
            }
        }
        result.into_iter().collect()
    }
}

impl<N, E> Default for StableMultigraph<N, E>
where
    N: Hash + Eq + Clone + std::fmt::Debug,
    E: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
