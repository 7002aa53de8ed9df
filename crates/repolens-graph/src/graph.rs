use repolens_core::{CodeEdge, CodeNode, NodeKind, RepoLensError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

/// Directed program graph held in memory: node storage keyed by id plus
/// parallel successor/predecessor edge-index lists. Nodes never hold
/// references to each other, so cycles are unremarkable.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, CodeNode>,
    node_order: Vec<String>,
    edges: Vec<CodeEdge>,
    successors: HashMap<String, Vec<usize>>,
    predecessors: HashMap<String, Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parsed nodes and edges. Edges whose endpoints are unknown
    /// are dropped with a warning rather than poisoning the graph.
    pub fn from_parts(nodes: Vec<CodeNode>, edges: Vec<CodeEdge>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.insert_node(node);
        }
        for edge in edges {
            if let Err(e) = graph.insert_edge(edge) {
                warn!("dropping edge: {}", e);
            }
        }
        graph
    }

    pub fn insert_node(&mut self, node: CodeNode) {
        if !self.nodes.contains_key(&node.id) {
            self.node_order.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn insert_edge(&mut self, edge: CodeEdge) -> Result<()> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(RepoLensError::InvalidInput(format!(
                "edge source not in graph: {}",
                edge.source
            )));
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(RepoLensError::InvalidInput(format!(
                "edge target not in graph: {}",
                edge.target
            )));
        }
        let index = self.edges.len();
        self.successors
            .entry(edge.source.clone())
            .or_default()
            .push(index);
        self.predecessors
            .entry(edge.target.clone())
            .or_default()
            .push(index);
        self.edges.push(edge);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&CodeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &CodeNode> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[CodeEdge] {
        &self.edges
    }

    /// Neighbor ids in edge insertion order, deterministic across runs.
    pub fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(indices) = self.successors.get(id) {
                for &index in indices {
                    out.push(self.edges[index].target.as_str());
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(indices) = self.predecessors.get(id) {
                for &index in indices {
                    out.push(self.edges[index].source.as_str());
                }
            }
        }
        out.dedup();
        out
    }

    /// The first stored edge connecting `a` and `b` in either direction,
    /// returned with its stored orientation.
    pub fn edge_between(&self, a: &str, b: &str) -> Option<&CodeEdge> {
        if let Some(indices) = self.successors.get(a) {
            for &index in indices {
                if self.edges[index].target == b {
                    return Some(&self.edges[index]);
                }
            }
        }
        if let Some(indices) = self.successors.get(b) {
            for &index in indices {
                if self.edges[index].target == a {
                    return Some(&self.edges[index]);
                }
            }
        }
        None
    }

    /// Undirected adjacency used by path finding: successors then
    /// predecessors, insertion order, deduplicated.
    pub(crate) fn undirected_neighbors(&self, id: &str) -> Vec<&str> {
        let mut out = self.neighbors(id, Direction::Both);
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            ..Default::default()
        };
        for node in self.nodes.values() {
            match node.kind {
                NodeKind::Function => stats.functions += 1,
                NodeKind::Class => stats.classes += 1,
                NodeKind::File => stats.files += 1,
            }
        }
        for edge in &self.edges {
            if edge.ambiguous {
                stats.ambiguous_edges += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub functions: usize,
    pub classes: usize,
    pub files: usize,
    pub ambiguous_edges: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::{EdgeKind, Language};

    fn node(id_name: &str) -> CodeNode {
        CodeNode::new(
            NodeKind::Function,
            id_name,
            id_name,
            "test.py",
            1,
            2,
            Language::Python,
        )
    }

    #[test]
    fn rejects_dangling_edges() {
        let mut graph = DependencyGraph::new();
        graph.insert_node(node("a"));
        let err = graph
            .insert_edge(CodeEdge::new(
                "function:a:test.py:1",
                "function:missing:test.py:1",
                EdgeKind::Call,
            ))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn neighbors_follow_edge_insertion_order() {
        let a = node("a");
        let b = node("b");
        let c = node("c");
        let edges = vec![
            CodeEdge::new(&a.id, &c.id, EdgeKind::Call),
            CodeEdge::new(&a.id, &b.id, EdgeKind::Call),
            CodeEdge::new(&b.id, &a.id, EdgeKind::Call),
        ];
        let graph = DependencyGraph::from_parts(vec![a.clone(), b.clone(), c.clone()], edges);

        let out = graph.neighbors(&a.id, Direction::Out);
        assert_eq!(out, vec![c.id.as_str(), b.id.as_str()]);

        let incoming = graph.neighbors(&a.id, Direction::In);
        assert_eq!(incoming, vec![b.id.as_str()]);
    }

    #[test]
    fn edge_between_prefers_stored_orientation() {
        let a = node("a");
        let b = node("b");
        let edges = vec![CodeEdge::new(&b.id, &a.id, EdgeKind::Call)];
        let graph = DependencyGraph::from_parts(vec![a.clone(), b.clone()], edges);

        let edge = graph.edge_between(&a.id, &b.id).unwrap();
        assert_eq!(edge.source, b.id);
        assert_eq!(edge.target, a.id);
    }

    #[test]
    fn stats_count_kinds_and_ambiguity() {
        let a = node("a");
        let b = node("b");
        let edges = vec![CodeEdge::new(&a.id, &b.id, EdgeKind::Call).ambiguous()];
        let graph = DependencyGraph::from_parts(vec![a, b], edges);
        let stats = graph.stats();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.functions, 2);
        assert_eq!(stats.ambiguous_edges, 1);
    }
}
