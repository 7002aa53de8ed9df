use crate::graph::DependencyGraph;
use repolens_core::CodeEdge;
use std::collections::{BTreeMap, HashSet};

/// A minimum-hop path through the undirected projection of the graph.
/// Edges are reported with their stored direction.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPath {
    pub nodes: Vec<String>,
    pub edges: Vec<CodeEdge>,
}

impl DependencyGraph {
    /// Find the minimum-hop path connecting any source to any (distinct)
    /// sink, ignoring edge direction for reachability. Ties are broken by
    /// hop count first, then by the lexicographic node-id sequence, so the
    /// result is deterministic. Returns `None` when no pair is connected.
    pub fn shortest_path(
        &self,
        sources: &HashSet<String>,
        sinks: &HashSet<String>,
    ) -> Option<GraphPath> {
        let mut sorted_sources: Vec<&String> = sources.iter().filter(|s| self.contains(s)).collect();
        sorted_sources.sort_unstable();
        let live_sinks: HashSet<&str> = sinks
            .iter()
            .filter(|s| self.contains(s))
            .map(String::as_str)
            .collect();
        if sorted_sources.is_empty() || live_sinks.is_empty() {
            return None;
        }

        let mut best: Option<Vec<String>> = None;
        for source in sorted_sources {
            for candidate in self.lexicographic_bfs(source, &live_sinks) {
                let better = match &best {
                    None => true,
                    Some(current) => {
                        (candidate.len(), &candidate) < (current.len(), current)
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        let nodes = best?;
        let edges = nodes
            .windows(2)
            .filter_map(|pair| self.edge_between(&pair[0], &pair[1]).cloned())
            .collect();
        Some(GraphPath { nodes, edges })
    }

    /// Level-by-level BFS from `start` keeping, per node, the
    /// lexicographically smallest path among all shortest ones. Returns the
    /// best path to every reachable sink other than `start` itself.
    fn lexicographic_bfs(&self, start: &str, sinks: &HashSet<&str>) -> Vec<Vec<String>> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.to_string());
        let mut frontier: BTreeMap<String, Vec<String>> = BTreeMap::new();
        frontier.insert(start.to_string(), vec![start.to_string()]);

        let mut found: Vec<Vec<String>> = Vec::new();
        let mut satisfied: HashSet<String> = HashSet::new();

        while !frontier.is_empty() && satisfied.len() < sinks.len() {
            let mut next: BTreeMap<String, Vec<String>> = BTreeMap::new();

            // Iterating paths in sorted order makes the first write for a
            // node the lexicographically smallest path of this level.
            let mut level: Vec<(String, Vec<String>)> = frontier.into_iter().collect();
            level.sort_by(|a, b| a.1.cmp(&b.1));

            for (node, path) in level {
                if node != start && sinks.contains(node.as_str()) && !satisfied.contains(&node) {
                    satisfied.insert(node.clone());
                    found.push(path.clone());
                }
                for neighbor in self.undirected_neighbors(&node) {
                    if visited.contains(neighbor) || next.contains_key(neighbor) {
                        continue;
                    }
                    let mut extended = path.clone();
                    extended.push(neighbor.to_string());
                    next.insert(neighbor.to_string(), extended);
                }
            }

            for node in next.keys() {
                visited.insert(node.clone());
            }
            frontier = next;
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;
    use repolens_core::{CodeEdge, CodeNode, EdgeKind, Language, NodeKind};

    fn node(name: &str) -> CodeNode {
        CodeNode::new(
            NodeKind::Function,
            name,
            name,
            "test.py",
            1,
            2,
            Language::Python,
        )
    }

    fn id(name: &str) -> String {
        format!("function:{}:test.py:1", name)
    }

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| id(n)).collect()
    }

    fn build(names: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let nodes = names.iter().map(|n| node(n)).collect();
        let edges = edges
            .iter()
            .map(|(a, b)| CodeEdge::new(id(a), id(b), EdgeKind::Call))
            .collect();
        DependencyGraph::from_parts(nodes, edges)
    }

    #[test]
    fn direct_edge_is_the_path() {
        let graph = build(&["a", "b"], &[("a", "b")]);
        let path = graph
            .shortest_path(&set(&["a"]), &set(&["b"]))
            .unwrap();
        assert_eq!(path.nodes, vec![id("a"), id("b")]);
        assert_eq!(path.edges.len(), 1);
        assert_eq!(path.edges[0].source, id("a"));
    }

    #[test]
    fn direction_is_ignored_for_reachability_but_reported_as_stored() {
        let graph = build(&["a", "b"], &[("b", "a")]);
        let path = graph
            .shortest_path(&set(&["a"]), &set(&["b"]))
            .unwrap();
        assert_eq!(path.nodes, vec![id("a"), id("b")]);
        // stored orientation is b -> a
        assert_eq!(path.edges[0].source, id("b"));
        assert_eq!(path.edges[0].target, id("a"));
    }

    #[test]
    fn minimum_hop_path_wins() {
        // a-b-d and a-c-e-d; shortest a..d is via b
        let graph = build(
            &["a", "b", "c", "d", "e"],
            &[("a", "b"), ("b", "d"), ("a", "c"), ("c", "e"), ("e", "d")],
        );
        let path = graph
            .shortest_path(&set(&["a"]), &set(&["d"]))
            .unwrap();
        assert_eq!(path.nodes, vec![id("a"), id("b"), id("d")]);
    }

    #[test]
    fn equal_length_paths_break_ties_lexicographically() {
        // two 2-hop routes a-b-d and a-c-d; b sorts before c
        let graph = build(
            &["a", "b", "c", "d"],
            &[("a", "c"), ("c", "d"), ("a", "b"), ("b", "d")],
        );
        let path = graph
            .shortest_path(&set(&["a"]), &set(&["d"]))
            .unwrap();
        assert_eq!(path.nodes, vec![id("a"), id("b"), id("d")]);
    }

    #[test]
    fn disconnected_pair_returns_none() {
        let graph = build(&["a", "b", "c", "d"], &[("a", "b"), ("c", "d")]);
        assert!(graph
            .shortest_path(&set(&["a"]), &set(&["c"]))
            .is_none());
    }

    #[test]
    fn multi_source_multi_sink_picks_closest_pair() {
        // a-x-b (2 hops), c-d (1 hop)
        let graph = build(
            &["a", "x", "b", "c", "d"],
            &[("a", "x"), ("x", "b"), ("c", "d")],
        );
        let sources = set(&["a", "c"]);
        let sinks = set(&["b", "d"]);
        let path = graph.shortest_path(&sources, &sinks).unwrap();
        assert_eq!(path.nodes, vec![id("c"), id("d")]);
    }

    #[test]
    fn identical_source_and_sink_sets_find_connected_pair() {
        let graph = build(&["a", "b", "c"], &[("a", "b")]);
        let hits = set(&["a", "b", "c"]);
        let path = graph.shortest_path(&hits, &hits).unwrap();
        assert_eq!(path.nodes, vec![id("a"), id("b")]);
        assert_eq!(path.edges.len(), 1);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let graph = build(&["a", "b"], &[("a", "b")]);
        let mut sources = set(&["a"]);
        sources.insert("function:ghost:test.py:9".to_string());
        let path = graph.shortest_path(&sources, &set(&["b"])).unwrap();
        assert_eq!(path.nodes, vec![id("a"), id("b")]);
    }
}
