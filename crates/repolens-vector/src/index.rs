use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CollectionStatus, CreateCollectionBuilder, Distance, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use repolens_core::{CodeNode, RepoLensError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::make_snippet;

/// Upsert batch size against the external index.
const UPSERT_BATCH_SIZE: usize = 100;

/// Scroll page size for payload listings.
const SCROLL_PAGE_SIZE: u32 = 256;

/// The subset of node fields stored next to each vector, enough to render a
/// search result without loading the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub node_id: String,
    pub name: String,
    pub snippet: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub doc: String,
}

impl NodePayload {
    pub fn from_node(node: &CodeNode) -> Self {
        Self {
            node_id: node.id.clone(),
            name: node.name.clone(),
            snippet: make_snippet(node),
            file: node.file.clone(),
            start_line: node.start_line,
            end_line: node.end_line,
            doc: node.doc.clone(),
        }
    }
}

/// One vector entry bound for a collection.
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub point_id: u64,
    pub vector: Vec<f32>,
    pub payload: NodePayload,
}

/// A search hit as returned by the index, highest score first.
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub point_id: u64,
    pub score: f32,
    pub payload: Option<NodePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub points_count: u64,
    pub ready: bool,
}

/// Narrow, thread-safe client interface over the external ANN index. The
/// production implementation talks to Qdrant; tests use the in-memory one.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create `name` with the given dimension and cosine distance. With
    /// `recreate`, any existing collection of that name is dropped first.
    async fn ensure_collection(&self, name: &str, dimension: usize, recreate: bool) -> Result<()>;

    /// Idempotent on point id; returns the number of points written.
    async fn upsert(&self, name: &str, points: Vec<PointRecord>) -> Result<usize>;

    /// Descending-score nearest neighbors.
    async fn search(&self, name: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<ScoredHit>>;

    /// Full payload listing, used by the keyword-scan fallback.
    async fn scroll_payloads(&self, name: &str) -> Result<Vec<(u64, NodePayload)>>;

    async fn count(&self, name: &str) -> Result<u64>;

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>>;

    /// Returns whether a collection was actually deleted.
    async fn delete_collection(&self, name: &str) -> Result<bool>;
}

/// Qdrant-backed implementation. Construction is lazy: no connection is
/// made until the first call.
pub struct QdrantIndex {
    client: Qdrant,
    url: String,
}

impl QdrantIndex {
    pub fn connect(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RepoLensError::IndexUnavailable(format!("{}: {}", url, e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_err(&self, err: QdrantError) -> RepoLensError {
        let message = err.to_string();
        if message.contains("doesn't exist") || message.contains("Not found") {
            RepoLensError::NotFound(message)
        } else {
            RepoLensError::IndexUnavailable(format!("{}: {}", self.url, message))
        }
    }

    /// Collection readiness: vectors may be accepted while the ANN
    /// structure is still being built, in which case searches must degrade.
    async fn ensure_ready(&self, name: &str) -> Result<()> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| self.map_err(e))?;
        let Some(info) = info.result else {
            return Err(RepoLensError::NotFound(format!("collection {}", name)));
        };
        let points = info.points_count.unwrap_or(0);
        let ready = info.status() == CollectionStatus::Green;
        if points > 0 && !ready {
            return Err(RepoLensError::IndexNotReady(format!(
                "collection {} is still building its index",
                name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize, recreate: bool) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| self.map_err(e))?;

        if exists && recreate {
            info!("recreating collection {}", name);
            self.client
                .delete_collection(name)
                .await
                .map_err(|e| self.map_err(e))?;
        } else if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dimension as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<PointRecord>) -> Result<usize> {
        let total = points.len();
        let mut written = 0usize;

        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            let structs: Vec<PointStruct> = batch
                .iter()
                .map(|point| {
                    let payload: Payload = serde_json::to_value(&point.payload)
                        .ok()
                        .and_then(|value| Payload::try_from(value).ok())
                        .unwrap_or_else(Payload::new);
                    PointStruct::new(point.point_id, point.vector.clone(), payload)
                })
                .collect();

            self.client
                .upsert_points(UpsertPointsBuilder::new(name, structs).wait(true))
                .await
                .map_err(|e| self.map_err(e))?;
            written += batch.len();
            debug!("upserted {}/{} points into {}", written, total, name);
        }

        Ok(written)
    }

    async fn search(&self, name: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<ScoredHit>> {
        self.ensure_ready(name).await?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(name, vector, limit as u64).with_payload(true),
            )
            .await
            .map_err(|e| self.map_err(e))?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let point_id = point.id.as_ref().and_then(numeric_point_id).unwrap_or(0);
                let payload = parse_payload(point.payload);
                ScoredHit {
                    point_id,
                    score: point.score,
                    payload,
                }
            })
            .collect();
        Ok(hits)
    }

    async fn scroll_payloads(&self, name: &str) -> Result<Vec<(u64, NodePayload)>> {
        let mut out = Vec::new();
        let mut offset = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(name)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true);
            if let Some(next) = offset.take() {
                builder = builder.offset(next);
            }
            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| self.map_err(e))?;

            for point in response.result {
                let point_id = point.id.as_ref().and_then(numeric_point_id).unwrap_or(0);
                if let Some(payload) = parse_payload(point.payload) {
                    out.push((point_id, payload));
                }
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(out)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| self.map_err(e))?;

        let mut summaries = Vec::new();
        for description in response.collections {
            let info = self
                .client
                .collection_info(&description.name)
                .await
                .map_err(|e| self.map_err(e))?;
            let (points, ready) = info
                .result
                .map(|r| {
                    let ready = r.status() == CollectionStatus::Green;
                    (r.points_count.unwrap_or(0), ready)
                })
                .unwrap_or((0, false));
            summaries.push(CollectionSummary {
                name: description.name,
                points_count: points,
                ready,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| self.map_err(e))?;
        if !exists {
            return Ok(false);
        }
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(true)
    }
}

fn numeric_point_id(id: &qdrant_client::qdrant::PointId) -> Option<u64> {
    match id.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(*n),
        PointIdOptions::Uuid(_) => None,
    }
}

fn parse_payload(
    payload: std::collections::HashMap<String, qdrant_client::qdrant::Value>,
) -> Option<NodePayload> {
    if payload.is_empty() {
        return None;
    }
    let object: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(key, value)| (key, qdrant_value_to_json(value)))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object)).ok()
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind;
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(qdrant_value_to_json).collect(),
        ),
        Some(Kind::StructValue(fields)) => serde_json::Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(key, value)| (key, qdrant_value_to_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::{Language, NodeKind};

    #[test]
    fn payload_captures_preview_fields() {
        let node = CodeNode::new(
            NodeKind::Function,
            "parse",
            "parse",
            "src/parse.py",
            10,
            42,
            Language::Python,
        )
        .with_code("def parse(data):\n    return data")
        .with_doc("Parse things.");

        let payload = NodePayload::from_node(&node);
        assert_eq!(payload.node_id, node.id);
        assert_eq!(payload.file, "src/parse.py");
        assert_eq!(payload.start_line, 10);
        assert_eq!(payload.end_line, 42);
        assert!(payload.snippet.starts_with("def parse"));
        assert_eq!(payload.doc, "Parse things.");
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = NodePayload {
            node_id: "function:a:a.py:1".into(),
            name: "a".into(),
            snippet: "def a(): pass".into(),
            file: "a.py".into(),
            start_line: 1,
            end_line: 1,
            doc: String::new(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        let back: NodePayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
    }
}
