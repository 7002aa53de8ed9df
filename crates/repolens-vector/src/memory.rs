use crate::index::{CollectionSummary, NodePayload, PointRecord, ScoredHit, VectorIndex};
use async_trait::async_trait;
use dashmap::DashMap;
use repolens_core::{RepoLensError, Result};

/// In-process vector index with the same contract as the Qdrant client.
/// Backs unit and API tests, and doubles as a smoke-run index when no
/// external server is around.
#[derive(Default)]
pub struct MemoryIndex {
    collections: DashMap<String, MemoryCollection>,
    /// When set, searches fail with `IndexUnavailable`, simulating a
    /// refused connection.
    unavailable: std::sync::atomic::AtomicBool,
}

struct MemoryCollection {
    dimension: usize,
    points: Vec<PointRecord>,
    ready: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a collection as still building its ANN structure; searches
    /// then fail with `IndexNotReady` until `set_ready(true)`.
    pub fn set_ready(&self, name: &str, ready: bool) {
        if let Some(mut collection) = self.collections.get_mut(name) {
            collection.ready = ready;
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RepoLensError::IndexUnavailable(
                "memory index marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize, recreate: bool) -> Result<()> {
        self.check_available()?;
        if recreate {
            self.collections.remove(name);
        }
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| MemoryCollection {
                dimension,
                points: Vec::new(),
                ready: true,
            });
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<PointRecord>) -> Result<usize> {
        self.check_available()?;
        let mut collection = self
            .collections
            .get_mut(name)
            .ok_or_else(|| RepoLensError::NotFound(format!("collection {}", name)))?;

        let dimension = collection.dimension;
        let written = points.len();
        for point in points {
            if point.vector.len() != dimension {
                return Err(RepoLensError::InvalidInput(format!(
                    "vector dimension {} does not match collection dimension {}",
                    point.vector.len(),
                    dimension
                )));
            }
            let existing = collection
                .points
                .iter()
                .position(|existing| existing.point_id == point.point_id);
            match existing {
                Some(position) => collection.points[position] = point,
                None => collection.points.push(point),
            }
        }
        Ok(written)
    }

    async fn search(&self, name: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<ScoredHit>> {
        self.check_available()?;
        let collection = self
            .collections
            .get(name)
            .ok_or_else(|| RepoLensError::NotFound(format!("collection {}", name)))?;
        if !collection.ready && !collection.points.is_empty() {
            return Err(RepoLensError::IndexNotReady(format!(
                "collection {} is still building its index",
                name
            )));
        }

        let mut hits: Vec<ScoredHit> = collection
            .points
            .iter()
            .map(|point| ScoredHit {
                point_id: point.point_id,
                score: cosine(&vector, &point.vector),
                payload: Some(point.payload.clone()),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.point_id.cmp(&b.point_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll_payloads(&self, name: &str) -> Result<Vec<(u64, NodePayload)>> {
        self.check_available()?;
        let collection = self
            .collections
            .get(name)
            .ok_or_else(|| RepoLensError::NotFound(format!("collection {}", name)))?;
        Ok(collection
            .points
            .iter()
            .map(|point| (point.point_id, point.payload.clone()))
            .collect())
    }

    async fn count(&self, name: &str) -> Result<u64> {
        self.check_available()?;
        Ok(self
            .collections
            .get(name)
            .map(|c| c.points.len() as u64)
            .unwrap_or(0))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        self.check_available()?;
        let mut summaries: Vec<CollectionSummary> = self
            .collections
            .iter()
            .map(|entry| CollectionSummary {
                name: entry.key().clone(),
                points_count: entry.value().points.len() as u64,
                ready: entry.value().ready,
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.collections.remove(name).is_some())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: u64, vector: Vec<f32>) -> PointRecord {
        PointRecord {
            point_id: id,
            vector,
            payload: NodePayload {
                node_id: format!("function:f{}:f.py:1", id),
                name: format!("f{}", id),
                snippet: String::new(),
                file: "f.py".into(),
                start_line: 1,
                end_line: 1,
                doc: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn search_orders_by_descending_score() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, false).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point(1, vec![1.0, 0.0]),
                    point(2, vec![0.0, 1.0]),
                    point(3, vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", vec![1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].point_id, 1);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_point_id() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, false).await.unwrap();
        index.upsert("c", vec![point(1, vec![1.0, 0.0])]).await.unwrap();
        index.upsert("c", vec![point(1, vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recreate_drops_existing_points() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, false).await.unwrap();
        index.upsert("c", vec![point(1, vec![1.0, 0.0])]).await.unwrap();
        index.ensure_collection("c", 2, true).await.unwrap();
        assert_eq!(index.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn not_ready_collection_fails_search_with_index_not_ready() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, false).await.unwrap();
        index.upsert("c", vec![point(1, vec![1.0, 0.0])]).await.unwrap();
        index.set_ready("c", false);

        let err = index.search("c", vec![1.0, 0.0], 1).await.unwrap_err();
        assert_eq!(err.kind(), "IndexNotReady");

        // scroll still works; the fallback path depends on this
        assert_eq!(index.scroll_payloads("c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_index_fails_everything() {
        let index = MemoryIndex::new();
        index.set_unavailable(true);
        let err = index.ensure_collection("c", 2, false).await.unwrap_err();
        assert_eq!(err.kind(), "IndexUnavailable");
    }
}
