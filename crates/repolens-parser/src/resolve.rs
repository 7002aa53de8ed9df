use crate::extractor::{CallRef, ImportRef};
use repolens_core::{CodeEdge, CodeNode, EdgeKind, NodeKind};
use std::collections::HashMap;

/// Secondary index over parsed nodes, in node insertion order. Call targets
/// are functions and classes, keyed by simple and qualified name; import
/// targets additionally include file nodes, keyed by file name and stem.
pub struct NameIndex {
    callables: HashMap<String, Vec<String>>,
    importables: HashMap<String, Vec<String>>,
    file_of: HashMap<String, String>,
}

impl NameIndex {
    pub fn build(nodes: &[CodeNode]) -> Self {
        let mut callables: HashMap<String, Vec<String>> = HashMap::new();
        let mut importables: HashMap<String, Vec<String>> = HashMap::new();
        let mut file_of = HashMap::new();

        for node in nodes {
            file_of.insert(node.id.clone(), node.file.clone());

            let mut keys = vec![node.name.clone()];
            // Qualified names resolve receiver-qualified calls (Class.method).
            if let Some(qualname) = qualname_of(&node.id) {
                if qualname != node.name {
                    keys.push(qualname.to_string());
                }
            }

            if node.kind == NodeKind::File {
                // `import utils` should find the file node for utils.py.
                if let Some((stem, _)) = node.name.rsplit_once('.') {
                    if !stem.is_empty() {
                        keys.push(stem.to_string());
                    }
                }
                for key in keys {
                    push_id(&mut importables, key, &node.id);
                }
            } else {
                for key in keys {
                    push_id(&mut callables, key.clone(), &node.id);
                    push_id(&mut importables, key, &node.id);
                }
            }
        }

        Self {
            callables,
            importables,
            file_of,
        }
    }

    pub fn lookup_callable(&self, name: &str) -> &[String] {
        self.callables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lookup_importable(&self, name: &str) -> &[String] {
        self.importables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn file_of(&self, id: &str) -> Option<&str> {
        self.file_of.get(id).map(String::as_str)
    }
}

fn push_id(map: &mut HashMap<String, Vec<String>>, key: String, id: &str) {
    let ids = map.entry(key).or_default();
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

fn qualname_of(id: &str) -> Option<&str> {
    // <kind>:<qualname>:<relpath>:<start_line>
    id.split(':').nth(1)
}

/// Resolve raw call and import references against the name index, emitting
/// edges with the spec's ambiguity and tie-break rules:
/// - a single candidate resolves cleanly;
/// - with several candidates, one in the caller's own file wins;
/// - otherwise every candidate gets an edge marked ambiguous;
/// - unresolved names are dropped;
/// - duplicate (source, target, type) triples collapse, an unambiguous
///   observation upgrading an ambiguous one.
pub fn resolve_edges(
    nodes: &[CodeNode],
    calls: &[CallRef],
    imports: &[ImportRef],
) -> Vec<CodeEdge> {
    let index = NameIndex::build(nodes);
    let mut builder = EdgeBuilder::default();

    for call in calls {
        let mut candidates: Vec<&String> = index.lookup_callable(&call.name).iter().collect();
        if candidates.is_empty() {
            if let Some(qualified) = &call.qualified {
                candidates = index.lookup_callable(qualified).iter().collect();
            }
        }
        // A function calling its own name is recursion and keeps its
        // self-loop; a file node matching a top-level call is noise.
        candidates.retain(|id| id.as_str() != call.caller || !call.caller.starts_with("file:"));
        if candidates.is_empty() {
            continue;
        }

        if candidates.len() == 1 {
            builder.add(CodeEdge::new(&call.caller, candidates[0], EdgeKind::Call));
            continue;
        }

        let caller_file = index.file_of(&call.caller);
        let same_file: Vec<&&String> = candidates
            .iter()
            .filter(|id| index.file_of(id) == caller_file)
            .collect();
        if same_file.len() == 1 {
            builder.add(CodeEdge::new(&call.caller, *same_file[0], EdgeKind::Call));
        } else {
            for id in candidates {
                builder.add(CodeEdge::new(&call.caller, id, EdgeKind::Call).ambiguous());
            }
        }
    }

    for import in imports {
        let candidates = index.lookup_importable(&import.name);
        let candidates: Vec<&String> = candidates
            .iter()
            .filter(|id| id.as_str() != import.importer)
            .collect();
        if candidates.is_empty() {
            continue;
        }
        if candidates.len() == 1 {
            builder.add(CodeEdge::new(&import.importer, candidates[0], EdgeKind::Import));
        } else {
            for id in candidates {
                builder.add(CodeEdge::new(&import.importer, id, EdgeKind::Import).ambiguous());
            }
        }
    }

    builder.into_edges()
}

#[derive(Default)]
struct EdgeBuilder {
    edges: Vec<CodeEdge>,
    seen: HashMap<(String, String, EdgeKind), usize>,
}

impl EdgeBuilder {
    fn add(&mut self, edge: CodeEdge) {
        let key = (edge.source.clone(), edge.target.clone(), edge.kind);
        match self.seen.get(&key) {
            Some(&position) => {
                if !edge.ambiguous {
                    self.edges[position].ambiguous = false;
                }
            }
            None => {
                self.seen.insert(key, self.edges.len());
                self.edges.push(edge);
            }
        }
    }

    fn into_edges(self) -> Vec<CodeEdge> {
        self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::{Language, NodeKind};

    fn function(name: &str, file: &str, line: u32) -> CodeNode {
        CodeNode::new(
            NodeKind::Function,
            name,
            name,
            file,
            line,
            line + 1,
            Language::Python,
        )
    }

    fn file_node(file: &str, lines: u32) -> CodeNode {
        CodeNode::new(NodeKind::File, file, file, file, 1, lines, Language::Python)
    }

    fn call(caller: &CodeNode, name: &str) -> CallRef {
        CallRef {
            caller: caller.id.clone(),
            name: name.to_string(),
            qualified: None,
        }
    }

    #[test]
    fn unique_name_resolves_unambiguously() {
        let a = function("a", "a.py", 1);
        let b = function("b", "b.py", 1);
        let calls = vec![call(&a, "b")];
        let nodes = vec![a.clone(), b.clone()];

        let edges = resolve_edges(&nodes, &calls, &[]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, a.id);
        assert_eq!(edges[0].target, b.id);
        assert_eq!(edges[0].kind, EdgeKind::Call);
        assert!(!edges[0].ambiguous);
    }

    #[test]
    fn multiple_candidates_are_all_marked_ambiguous() {
        let caller = function("main", "main.py", 1);
        let foo1 = function("foo", "one.py", 1);
        let foo2 = function("foo", "two.py", 1);
        let calls = vec![call(&caller, "foo")];
        let nodes = vec![caller.clone(), foo1.clone(), foo2.clone()];

        let edges = resolve_edges(&nodes, &calls, &[]);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.ambiguous));
        let targets: Vec<&str> = edges.iter().map(|e| e.target.as_str()).collect();
        assert!(targets.contains(&foo1.id.as_str()));
        assert!(targets.contains(&foo2.id.as_str()));
    }

    #[test]
    fn same_file_candidate_wins_tie_break() {
        let caller = function("main", "one.py", 10);
        let local = function("foo", "one.py", 1);
        let remote = function("foo", "two.py", 1);
        let calls = vec![call(&caller, "foo")];
        let nodes = vec![caller.clone(), local.clone(), remote];

        let edges = resolve_edges(&nodes, &calls, &[]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, local.id);
        assert!(!edges[0].ambiguous);
    }

    #[test]
    fn unresolved_names_are_dropped() {
        let a = function("a", "a.py", 1);
        let calls = vec![call(&a, "print")];
        let edges = resolve_edges(&[a], &calls, &[]);
        assert!(edges.is_empty());
    }

    #[test]
    fn recursion_produces_a_self_loop() {
        let f = function("fact", "fact.py", 1);
        let calls = vec![call(&f, "fact")];
        let edges = resolve_edges(&[f.clone()], &calls, &[]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, f.id);
        assert_eq!(edges[0].target, f.id);
    }

    #[test]
    fn duplicate_observations_collapse() {
        let a = function("a", "a.py", 1);
        let b = function("b", "b.py", 1);
        let calls = vec![call(&a, "b"), call(&a, "b"), call(&a, "b")];
        let edges = resolve_edges(&[a, b], &calls, &[]);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn import_resolves_to_file_node_by_stem() {
        let main = file_node("main.py", 3);
        let utils = file_node("utils.py", 20);
        let imports = vec![ImportRef {
            importer: main.id.clone(),
            name: "utils".to_string(),
        }];
        let edges = resolve_edges(&[main.clone(), utils.clone()], &[], &imports);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Import);
        assert_eq!(edges[0].source, main.id);
        assert_eq!(edges[0].target, utils.id);
    }
}
