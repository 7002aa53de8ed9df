use crate::engine::QueryEngine;
use repolens_core::{EdgeKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub node_id: String,
    pub code: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub doc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRef {
    pub node_id: String,
    pub excerpt_line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub one_liner: String,
    pub steps: Vec<String>,
    pub inputs_outputs: Vec<String>,
    pub caveats: Vec<String>,
    pub node_refs: Vec<NodeRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeOutput {
    pub answer_path: Vec<String>,
    pub path_edges: Vec<PathEdge>,
    pub snippets: Vec<Snippet>,
    pub summary: Summary,
    pub query: String,
    pub total_results: usize,
    pub processing_time: f64,
}

/// Fixed disclaimers attached to every summary.
const CAVEATS: [&str; 3] = [
    "Analysis is based on static code structure and semantic similarity.",
    "Results are limited to indexed code components.",
    "Call edges resolved by name may include ambiguous candidates.",
];

impl QueryEngine {
    /// Search, then connect the top hits through the program graph: the
    /// answer path is the minimum-hop route (ignoring edge direction)
    /// between any two distinct hits, with snippets and a structured
    /// summary assembled from the nodes along it.
    pub async fn analyze(&self, query: &str, top_k: usize, collection: &str) -> Result<AnalyzeOutput> {
        let started = Instant::now();
        let search = self.search(query, top_k, collection).await?;

        let graph = self.graph.read().await;

        // Hits that exist in the loaded graph, relevance order, deduplicated.
        let mut hit_ids: Vec<String> = Vec::new();
        for hit in &search.results {
            if graph.contains(&hit.node_id) && !hit_ids.contains(&hit.node_id) {
                hit_ids.push(hit.node_id.clone());
            }
        }

        let (answer_path, path_edges) = if hit_ids.is_empty() {
            (Vec::new(), Vec::new())
        } else if hit_ids.len() == 1 {
            (vec![hit_ids[0].clone()], Vec::new())
        } else {
            let id_set: HashSet<String> = hit_ids.iter().cloned().collect();
            match graph.shortest_path(&id_set, &id_set) {
                Some(path) => {
                    let edges = path
                        .edges
                        .iter()
                        .map(|edge| PathEdge {
                            source: edge.source.clone(),
                            target: edge.target.clone(),
                            kind: edge.kind,
                        })
                        .collect();
                    (path.nodes, edges)
                }
                // No pair of hits is connected; the best single hit stands.
                None => (vec![hit_ids[0].clone()], Vec::new()),
            }
        };

        let snippets: Vec<Snippet> = answer_path
            .iter()
            .filter_map(|id| graph.node(id))
            .map(|node| Snippet {
                node_id: node.id.clone(),
                code: node.code.clone(),
                file: node.file.clone(),
                start_line: node.start_line,
                end_line: node.end_line,
                doc: node.doc.clone(),
            })
            .collect();
        drop(graph);

        let mut summary = build_summary(query, &snippets);
        if let Some(summarizer) = &self.summarizer {
            if let Some(text) = summarizer.summarize(query, &summary).await {
                summary.one_liner = text;
            }
        }

        debug!(
            "analyze '{}': {} hits, path of {}",
            query,
            search.total_results,
            answer_path.len()
        );
        Ok(AnalyzeOutput {
            answer_path,
            path_edges,
            snippets,
            summary,
            query: query.to_string(),
            total_results: search.total_results,
            processing_time: started.elapsed().as_secs_f64(),
        })
    }
}

fn build_summary(query: &str, snippets: &[Snippet]) -> Summary {
    if snippets.is_empty() {
        return Summary {
            one_liner: format!("No relevant code found for query: {}", query),
            steps: Vec::new(),
            inputs_outputs: Vec::new(),
            caveats: vec!["No matching code components were found.".to_string()],
            node_refs: Vec::new(),
        };
    }

    let mut files: Vec<&str> = snippets.iter().map(|s| s.file.as_str()).collect();
    files.dedup();
    let one_liner = format!(
        "Analysis of {} code components across {} files related to: {}",
        snippets.len(),
        files.len(),
        query
    );

    let steps = snippets
        .iter()
        .enumerate()
        .map(|(index, snippet)| {
            let name = name_from_node_id(&snippet.node_id);
            let what = first_sentence(&snippet.doc).unwrap_or("code execution");
            format!("{}. {} in {}: {}", index + 1, name, snippet.file, what)
        })
        .collect();

    let first = &snippets[0];
    let last = &snippets[snippets.len() - 1];
    let inputs_outputs = match (signature_of(first), signature_of(last)) {
        (Some(entry), Some(exit)) => vec![
            format!("Entry: {}", entry),
            format!("Exit: {}", exit),
        ],
        _ => vec!["Inputs and outputs could not be recovered from signatures.".to_string()],
    };

    let node_refs = snippets
        .iter()
        .map(|snippet| NodeRef {
            node_id: snippet.node_id.clone(),
            excerpt_line: signature_of(snippet).unwrap_or_default(),
        })
        .collect();

    Summary {
        one_liner,
        steps,
        inputs_outputs,
        caveats: CAVEATS.iter().map(|s| s.to_string()).collect(),
        node_refs,
    }
}

fn name_from_node_id(id: &str) -> &str {
    id.split(':').nth(1).unwrap_or(id)
}

/// First non-blank line of the code slice; the declaration header for every
/// supported language.
fn signature_of(snippet: &Snippet) -> Option<String> {
    snippet
        .code
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
}

fn first_sentence(doc: &str) -> Option<&str> {
    let line = doc.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    Some(line.split_inclusive('.').next().unwrap_or(line).trim())
}
