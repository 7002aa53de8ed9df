use crate::summarizer::SummarizerClient;
use repolens_graph::DependencyGraph;
use repolens_vector::{Embedder, Journal, VectorIndex};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Query-side faces of the pipeline: the embedder for query vectors, the
/// index for nearest neighbors, the graph for paths and snippets, and the
/// journal as the durable point-to-node fallback.
pub struct QueryEngine {
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) index: Arc<dyn VectorIndex>,
    pub(crate) graph: Arc<RwLock<DependencyGraph>>,
    pub(crate) journal: Arc<Journal>,
    pub(crate) summarizer: Option<SummarizerClient>,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        graph: Arc<RwLock<DependencyGraph>>,
        journal: Arc<Journal>,
    ) -> Self {
        Self {
            embedder,
            index,
            graph,
            journal,
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: SummarizerClient) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn graph(&self) -> &Arc<RwLock<DependencyGraph>> {
        &self.graph
    }
}
