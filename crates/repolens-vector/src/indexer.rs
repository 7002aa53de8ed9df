use crate::document::make_document;
use crate::embed::Embedder;
use crate::index::{NodePayload, PointRecord, VectorIndex};
use crate::journal::{IndexStatus, Journal};
use repolens_core::{RepoLensError, Result};
use repolens_graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Back-off schedule for retryable index errors.
const BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub collection: String,
    pub model: String,
    pub vector_size: usize,
    pub points_count: usize,
}

/// Embedding phase: render every node into its document and embed the lot.
/// Point ids are dense, starting at 1, in node insertion order. A transient
/// model failure gets one retry before the phase fails.
pub fn build_points(embedder: &dyn Embedder, graph: &DependencyGraph) -> Result<Vec<PointRecord>> {
    if graph.is_empty() {
        return Err(RepoLensError::InvalidInput(
            "graph has no nodes to index".to_string(),
        ));
    }

    let nodes: Vec<_> = graph.nodes().collect();
    let documents: Vec<String> = nodes.iter().map(|node| make_document(node)).collect();
    info!(
        "embedding {} documents with {}",
        documents.len(),
        embedder.model_name()
    );

    let vectors = match embedder.embed(&documents) {
        Ok(vectors) => vectors,
        Err(first) => {
            warn!("embedding failed, retrying once: {}", first);
            embedder.embed(&documents)?
        }
    };

    Ok(nodes
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(offset, (node, vector))| PointRecord {
            point_id: offset as u64 + 1,
            vector,
            payload: NodePayload::from_node(node),
        })
        .collect())
}

/// The point-id-to-node-id map materialized after an upsert.
pub fn point_map(points: &[PointRecord]) -> BTreeMap<u64, String> {
    points
        .iter()
        .map(|point| (point.point_id, point.payload.node_id.clone()))
        .collect()
}

/// Upsert phase: make sure the collection exists and push every point,
/// retrying connection failures with back-off. The ANN structure still
/// catching up afterwards is not a failure here.
pub async fn push_points(
    index: &dyn VectorIndex,
    collection: &str,
    dimension: usize,
    recreate: bool,
    points: &[PointRecord],
) -> Result<usize> {
    with_backoff(|| index.ensure_collection(collection, dimension, recreate)).await?;

    match with_backoff(|| index.upsert(collection, points.to_vec())).await {
        Ok(written) => Ok(written),
        Err(RepoLensError::IndexNotReady(_)) => Ok(points.len()),
        Err(e) => Err(e),
    }
}

/// Journal phase: persist the map and the status snapshot atomically.
pub fn journal_outcome(
    journal: &Journal,
    outcome: &IndexOutcome,
    map: &BTreeMap<u64, String>,
) -> Result<()> {
    journal.write_map(map)?;
    journal.write_status(&IndexStatus::completed(
        &outcome.collection,
        &outcome.model,
        outcome.vector_size,
        outcome.points_count,
    ))
}

/// The whole coordinator: embed, upsert, journal. The service runs the
/// phases separately to apply per-phase timeouts; this composition serves
/// the CLI and tests.
pub async fn index_graph(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    journal: &Journal,
    graph: &DependencyGraph,
    collection: &str,
    recreate: bool,
) -> Result<IndexOutcome> {
    let points = build_points(embedder, graph)?;
    let map = point_map(&points);
    let written = push_points(index, collection, embedder.dimension(), recreate, &points).await?;

    let outcome = IndexOutcome {
        collection: collection.to_string(),
        model: embedder.model_name().to_string(),
        vector_size: embedder.dimension(),
        points_count: written,
    };
    journal_outcome(journal, &outcome, &map)?;

    info!("indexed {} points into {}", written, collection);
    Ok(outcome)
}

/// Retry a retryable operation with 1 s / 2 s / 4 s back-off; anything not
/// marked retryable propagates immediately.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    for (attempt, delay) in BACKOFF.iter().enumerate() {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!("attempt {} failed ({}), backing off {:?}", attempt + 1, e, delay);
                tokio::time::sleep(*delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    op().await
}
