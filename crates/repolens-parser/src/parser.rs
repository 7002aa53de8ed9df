use crate::annotate::annotate_nodes;
use crate::collect::{collect_source_files, CollectConfig};
use crate::extractor::{extract_file, CallRef, ImportRef};
use crate::language::LanguageRegistry;
use crate::resolve::resolve_edges;
use repolens_core::{CodeEdge, CodeNode, RepoLensError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of parsing one repository snapshot.
#[derive(Debug)]
pub struct ParsedRepo {
    pub nodes: Vec<CodeNode>,
    pub edges: Vec<CodeEdge>,
    pub report: ParseReport,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ParseReport {
    pub files_seen: usize,
    pub files_parsed: usize,
    pub files_skipped: usize,
    /// (relative path, error) for files the parser gave up on.
    pub failures: Vec<(String, String)>,
}

pub struct RepoParser {
    registry: LanguageRegistry,
    collect_config: CollectConfig,
}

impl RepoParser {
    pub fn new() -> Self {
        Self {
            registry: LanguageRegistry::new(),
            collect_config: CollectConfig::default(),
        }
    }

    pub fn with_collect_config(mut self, config: CollectConfig) -> Self {
        self.collect_config = config;
        self
    }

    /// Parse every supported file under `root` into nodes and resolved
    /// edges. Individual file failures are recorded and skipped; the whole
    /// parse fails only when nothing could be parsed.
    pub fn parse_repository(&self, root: &Path) -> Result<ParsedRepo> {
        if !root.is_dir() {
            return Err(RepoLensError::InvalidInput(format!(
                "repository path does not exist: {}",
                root.display()
            )));
        }

        let files = collect_source_files(root, &self.collect_config)?;
        let mut report = ParseReport {
            files_seen: files.len(),
            ..Default::default()
        };

        let mut nodes: Vec<CodeNode> = Vec::new();
        let mut calls: Vec<CallRef> = Vec::new();
        let mut imports: Vec<ImportRef> = Vec::new();

        for path in &files {
            let Some(language) = self.registry.detect(path) else {
                report.files_skipped += 1;
                continue;
            };
            let relpath = relative_path(root, path);

            let source = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    debug!("unreadable file {}: {}", relpath, e);
                    report.failures.push((relpath, e.to_string()));
                    continue;
                }
            };

            let Some(mut parser) = self.registry.create_parser(&language) else {
                report.files_skipped += 1;
                continue;
            };
            let Some(tree) = parser.parse(&source, None) else {
                warn!("tree-sitter produced no tree for {}", relpath);
                report
                    .failures
                    .push((relpath, "tree-sitter produced no tree".to_string()));
                continue;
            };

            let extraction = extract_file(&language, &tree, &source, &relpath);
            debug!(
                "{}: {} nodes, {} call refs, {} import refs",
                relpath,
                extraction.nodes.len(),
                extraction.calls.len(),
                extraction.imports.len()
            );
            nodes.extend(extraction.nodes);
            calls.extend(extraction.calls);
            imports.extend(extraction.imports);
            report.files_parsed += 1;
        }

        if report.files_parsed == 0 && report.files_seen > 0 {
            return Err(RepoLensError::ParseFailed(format!(
                "no parseable files under {} ({} candidates)",
                root.display(),
                report.files_seen
            )));
        }

        let mut nodes = retain_meaningful_file_nodes(nodes, &calls, &imports);
        let edges = resolve_edges(&nodes, &calls, &imports);
        annotate_nodes(&mut nodes, &edges);

        info!(
            "parsed {}: {} files, {} nodes, {} edges ({} failures)",
            root.display(),
            report.files_parsed,
            nodes.len(),
            edges.len(),
            report.failures.len()
        );

        Ok(ParsedRepo {
            nodes,
            edges,
            report,
        })
    }
}

impl Default for RepoParser {
    fn default() -> Self {
        Self::new()
    }
}

/// File nodes anchor import edges and stand in for files with no extractable
/// members. A file that contributed functions or classes and takes no part
/// in imports or top-level calls adds nothing as a node of its own.
fn retain_meaningful_file_nodes(
    nodes: Vec<CodeNode>,
    calls: &[CallRef],
    imports: &[ImportRef],
) -> Vec<CodeNode> {
    use repolens_core::NodeKind;
    use std::collections::{HashMap, HashSet};

    let import_names: HashSet<&str> = imports.iter().map(|i| i.name.as_str()).collect();
    let callers: HashSet<&str> = calls.iter().map(|c| c.caller.as_str()).collect();
    let importers: HashSet<&str> = imports.iter().map(|i| i.importer.as_str()).collect();

    let mut members_per_file: HashMap<String, usize> = HashMap::new();
    for node in &nodes {
        if node.kind != NodeKind::File {
            *members_per_file.entry(node.file.clone()).or_default() += 1;
        }
    }

    nodes
        .into_iter()
        .filter(|node| {
            if node.kind != NodeKind::File {
                return true;
            }
            if importers.contains(node.id.as_str()) || callers.contains(node.id.as_str()) {
                return true;
            }
            if members_per_file.get(&node.file).copied().unwrap_or(0) == 0 {
                return true;
            }
            let stem = node
                .name
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(node.name.as_str());
            import_names.contains(node.name.as_str()) || import_names.contains(stem)
        })
        .collect()
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::{EdgeKind, NodeKind};
    use std::fs;

    fn parse_fixture(files: &[(&str, &str)]) -> ParsedRepo {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        RepoParser::new().parse_repository(dir.path()).unwrap()
    }

    #[test]
    fn single_file_repo() {
        let parsed = parse_fixture(&[("hello.py", "def hello(): return \"world\"\n")]);

        assert_eq!(parsed.nodes.len(), 1);
        assert_eq!(parsed.edges.len(), 0);
        let hello = &parsed.nodes[0];
        assert_eq!(hello.kind, NodeKind::Function);
        assert_eq!(hello.loc, 1);
        assert_eq!(hello.cyclomatic, 1);
        assert_eq!(hello.num_calls_in, 0);
        assert_eq!(hello.num_calls_out, 0);
    }

    #[test]
    fn direct_call_across_files() {
        let parsed = parse_fixture(&[
            ("a.py", "def a():\n    b()\n"),
            ("b.py", "def b():\n    pass\n"),
        ]);

        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.edges.len(), 1);

        let a = parsed.nodes.iter().find(|n| n.name == "a").unwrap();
        let b = parsed.nodes.iter().find(|n| n.name == "b").unwrap();
        assert_eq!(a.num_calls_out, 1);
        assert_eq!(b.num_calls_in, 1);

        let edge = &parsed.edges[0];
        assert_eq!(edge.kind, EdgeKind::Call);
        assert_eq!(edge.source, a.id);
        assert_eq!(edge.target, b.id);
        assert!(!edge.ambiguous);
    }

    #[test]
    fn ambiguous_call_fans_out_to_all_candidates() {
        let parsed = parse_fixture(&[
            ("one.py", "def foo():\n    pass\n"),
            ("two.py", "def foo():\n    pass\n"),
            ("main.py", "def main():\n    foo()\n"),
        ]);

        let main = parsed.nodes.iter().find(|n| n.name == "main").unwrap();
        let call_edges: Vec<&CodeEdge> = parsed
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Call && e.source == main.id)
            .collect();
        assert_eq!(call_edges.len(), 2);
        assert!(call_edges.iter().all(|e| e.ambiguous));
    }

    #[test]
    fn node_ids_are_unique() {
        let parsed = parse_fixture(&[
            ("pkg/a.py", "def a():\n    pass\n\ndef b():\n    a()\n"),
            ("pkg/b.py", "class C:\n    def a(self):\n        pass\n"),
        ]);
        let mut ids: Vec<&str> = parsed.nodes.iter().map(|n| n.id.as_str()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn edges_reference_existing_nodes() {
        let parsed = parse_fixture(&[
            ("a.py", "from b import helper\n\ndef a():\n    helper()\n"),
            ("b.py", "def helper():\n    pass\n"),
        ]);
        let ids: Vec<&str> = parsed.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &parsed.edges {
            assert!(ids.contains(&edge.source.as_str()), "dangling source");
            assert!(ids.contains(&edge.target.as_str()), "dangling target");
        }
    }

    #[test]
    fn unsupported_files_are_skipped_not_failed() {
        let parsed = parse_fixture(&[
            ("main.py", "def main():\n    pass\n"),
            ("notes.txt", "not source code\n"),
        ]);
        assert_eq!(parsed.report.files_parsed, 1);
        assert_eq!(parsed.report.files_skipped, 1);
        assert!(parsed.report.failures.is_empty());
    }

    #[test]
    fn empty_directory_parses_to_empty_graph() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = RepoParser::new().parse_repository(dir.path()).unwrap();
        assert!(parsed.nodes.is_empty());
        assert!(parsed.edges.is_empty());
    }

    #[test]
    fn missing_directory_is_invalid_input() {
        let err = RepoParser::new()
            .parse_repository(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }
}
