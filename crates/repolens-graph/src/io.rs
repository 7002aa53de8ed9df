use crate::graph::DependencyGraph;
use repolens_core::{CodeEdge, CodeNode, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

pub const SCHEMA_VERSION: &str = "1.0";
pub const GENERATED_BY: &str = "repolens";

/// On-disk shape of graph.json. This file is the authoritative handoff to
/// external consumers; the field set is fixed.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphFile {
    pub nodes: Vec<CodeNode>,
    pub edges: Vec<CodeEdge>,
    pub metadata: GraphMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    pub generated_by: String,
    pub schema_version: String,
}

impl DependencyGraph {
    /// Serialize to `path` via a temp file in the same directory plus an
    /// atomic rename, so readers never observe a half-written graph.
    pub fn save(&self, path: &Path) -> Result<()> {
        let nodes: Vec<CodeNode> = self.nodes().cloned().collect();
        let edges: Vec<CodeEdge> = self.edges().to_vec();
        let file = GraphFile {
            metadata: GraphMetadata {
                node_count: nodes.len(),
                edge_count: edges.len(),
                generated_by: GENERATED_BY.to_string(),
                schema_version: SCHEMA_VERSION.to_string(),
            },
            nodes,
            edges,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &file)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;

        info!(
            "saved graph to {} ({} nodes, {} edges)",
            path.display(),
            file.metadata.node_count,
            file.metadata.edge_count
        );
        Ok(())
    }

    /// Load a graph.json written by `save` (or any producer of the same
    /// schema). Edges with unknown endpoints are dropped with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                repolens_core::RepoLensError::NotFound(format!(
                    "graph file not found: {}",
                    path.display()
                ))
            } else {
                e.into()
            }
        })?;
        let file: GraphFile = serde_json::from_str(&text)?;

        let declared = file.metadata.node_count;
        if declared != file.nodes.len() {
            warn!(
                "{}: metadata declares {} nodes, file has {}",
                path.display(),
                declared,
                file.nodes.len()
            );
        }

        Ok(Self::from_parts(file.nodes, file.edges))
    }
}
