//! Parent/child graph built from relation rows.
//!
//! The relation table is the source of truth; this graph is loaded on demand
//! when an edge is about to be inserted, so that no committed row can close a
//! cycle. Edges point from **parent to child**.

use crate::domain::{RelationRow, TicketId};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// In-memory view of the parent→child edge set.
#[derive(Debug, Default)]
pub struct RelationGraph {
    graph: DiGraph<TicketId, ()>,
    node_map: HashMap<TicketId, NodeIndex>,
}

impl RelationGraph {
    /// Build the graph from relation rows.
    #[must_use]
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a RelationRow>) -> Self {
        let mut graph = Self::default();
        for row in rows {
            graph.add_edge(row.parent, row.child);
        }
        graph
    }

    fn node(&mut self, id: TicketId) -> NodeIndex {
        if let Some(&node) = self.node_map.get(&id) {
            return node;
        }
        let node = self.graph.add_node(id);
        self.node_map.insert(id, node);
        node
    }

    /// Add a parent→child edge without checking for cycles.
    pub fn add_edge(&mut self, parent: TicketId, child: TicketId) {
        let from = self.node(parent);
        let to = self.node(child);
        self.graph.update_edge(from, to, ());
    }

    /// Check whether adding `parent -> child` would create a cycle.
    ///
    /// True for a self-edge, or when `child` already reaches `parent`.
    #[must_use]
    pub fn would_create_cycle(&self, parent: TicketId, child: TicketId) -> bool {
        if parent == child {
            return true;
        }
        match (self.node_map.get(&child), self.node_map.get(&parent)) {
            (Some(&from), Some(&to)) => algo::has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }

    /// Returns `true` if the edge set already contains a cycle.
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// Number of distinct tickets appearing in an edge.
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(n: i64) -> TicketId {
        TicketId::new(n)
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let graph = RelationGraph::default();
        assert!(graph.would_create_cycle(id(7), id(7)));
    }

    #[test]
    fn back_edge_to_an_ancestor_is_a_cycle() {
        // 1 -> 2 -> 3
        let rows = [
            RelationRow::child(id(1), id(2)),
            RelationRow::child(id(2), id(3)),
        ];
        let graph = RelationGraph::from_rows(&rows);

        assert!(graph.would_create_cycle(id(3), id(1)));
        assert!(graph.would_create_cycle(id(2), id(1)));
        assert!(!graph.would_create_cycle(id(1), id(3)));
        assert!(!graph.would_create_cycle(id(3), id(4)));
        assert!(!graph.is_cyclic());
        assert_eq!(graph.ticket_count(), 3);
    }

    #[test]
    fn existing_cycle_is_reported() {
        let rows = [
            RelationRow::child(id(2), id(4)),
            RelationRow::child(id(4), id(2)),
        ];
        assert!(RelationGraph::from_rows(&rows).is_cyclic());
    }

    proptest! {
        #[test]
        fn guarded_insertion_never_produces_a_cycle(edges in proptest::collection::vec((1i64..12, 1i64..12), 0..40)) {
            let mut graph = RelationGraph::default();
            for (parent, child) in edges {
                if !graph.would_create_cycle(id(parent), id(child)) {
                    graph.add_edge(id(parent), id(child));
                }
            }
            prop_assert!(!graph.is_cyclic());
        }
    }
}
