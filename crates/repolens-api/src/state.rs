use crate::jobs::JobRegistry;
use dashmap::DashMap;
use repolens_core::{Result, Settings};
use repolens_graph::DependencyGraph;
use repolens_query::{QueryEngine, SummarizerClient};
use repolens_vector::{Embedder, FastembedEmbedder, Journal, QdrantIndex, VectorIndex};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub graph: Arc<RwLock<DependencyGraph>>,
    pub registry: Arc<JobRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub journal: Arc<Journal>,
    pub engine: Arc<QueryEngine>,
    /// Bounds concurrent background jobs to the worker pool size.
    pub workers: Arc<Semaphore>,
    /// Per-path mutual exclusion for artifact writes (graph files).
    path_locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl AppState {
    /// Production wiring: local embedding model, Qdrant client, graph
    /// preloaded from disk when a previous run left one.
    pub fn new(settings: Settings) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(FastembedEmbedder::new(&settings.model_name)?);
        let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::connect(&settings.qdrant_url)?);
        Self::with_components(settings, embedder, index)
    }

    /// Wiring with injected embedder/index; used by tests and smoke runs.
    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        let settings = Arc::new(settings);
        let journal = Arc::new(Journal::new(settings.map_path(), settings.status_path()));

        let graph_path = settings.graph_path();
        let graph = if graph_path.exists() {
            match DependencyGraph::load(&graph_path) {
                Ok(graph) => {
                    info!(
                        "loaded graph from {} ({} nodes)",
                        graph_path.display(),
                        graph.node_count()
                    );
                    graph
                }
                Err(e) => {
                    warn!("could not load {}: {}", graph_path.display(), e);
                    DependencyGraph::new()
                }
            }
        } else {
            DependencyGraph::new()
        };
        let graph = Arc::new(RwLock::new(graph));

        let mut engine = QueryEngine::new(
            embedder.clone(),
            index.clone(),
            graph.clone(),
            journal.clone(),
        );
        if let Some(url) = &settings.summarizer_url {
            engine = engine.with_summarizer(SummarizerClient::new(url));
        }

        Ok(Self {
            workers: Arc::new(Semaphore::new(settings.workers)),
            settings,
            graph,
            registry: Arc::new(JobRegistry::new()),
            embedder,
            index,
            journal,
            engine: Arc::new(engine),
            path_locks: Arc::new(DashMap::new()),
        })
    }

    /// Lock guarding writes to one artifact path.
    pub fn path_lock(&self, path: &PathBuf) -> Arc<Mutex<()>> {
        self.path_locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
