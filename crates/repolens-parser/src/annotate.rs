use repolens_core::{CodeEdge, CodeNode, EdgeKind};
use std::collections::HashMap;

/// Fill in the derived metrics on every node, in place:
/// - `loc` from the line span,
/// - `num_calls_out` / `num_calls_in` from the resolved call edges,
/// - `cyclomatic` clamped to at least 1 (extraction already computed it;
///   files that failed syntactic analysis keep the floor value).
pub fn annotate_nodes(nodes: &mut [CodeNode], edges: &[CodeEdge]) {
    let mut calls_out: HashMap<&str, u32> = HashMap::new();
    let mut calls_in: HashMap<&str, u32> = HashMap::new();

    for edge in edges {
        if edge.kind == EdgeKind::Call {
            *calls_out.entry(edge.source.as_str()).or_default() += 1;
            *calls_in.entry(edge.target.as_str()).or_default() += 1;
        }
    }

    for node in nodes.iter_mut() {
        node.loc = node.end_line.saturating_sub(node.start_line) + 1;
        node.cyclomatic = node.cyclomatic.max(1);
        node.num_calls_out = calls_out.get(node.id.as_str()).copied().unwrap_or(0);
        node.num_calls_in = calls_in.get(node.id.as_str()).copied().unwrap_or(0);
    }
}
