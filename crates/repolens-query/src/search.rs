use crate::engine::QueryEngine;
use repolens_core::{RepoLensError, Result};
use repolens_vector::{Embedder as _, NodePayload, VectorIndex as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub node_id: String,
    pub score: f32,
    pub snippet: String,
    pub file: String,
    pub start_line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutput {
    pub results: Vec<Hit>,
    pub query: String,
    pub total_results: usize,
}

impl QueryEngine {
    /// Semantic search: embed the query, hit the index, map payloads to
    /// hits. While the ANN structure is still building, degrade to a
    /// keyword scan over the stored payloads.
    pub async fn search(&self, query: &str, top_k: usize, collection: &str) -> Result<SearchOutput> {
        if query.trim().is_empty() {
            return Err(RepoLensError::InvalidInput("empty query".to_string()));
        }
        if top_k == 0 {
            return Err(RepoLensError::InvalidInput("top_k must be positive".to_string()));
        }

        let vectors = self.embedder.embed(&[query.to_string()])?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| RepoLensError::EmbedFailed("no query vector produced".to_string()))?;

        let results = match self.index.search(collection, vector, top_k).await {
            Ok(scored) => {
                let mut hits = Vec::with_capacity(scored.len());
                for point in scored {
                    let Some(payload) = point.payload else {
                        // Payloads should carry the node id; the journal is
                        // the durable fallback for points that predate it.
                        if let Some(node_id) = self.node_id_from_journal(point.point_id) {
                            hits.push(Hit {
                                node_id,
                                score: point.score,
                                snippet: String::new(),
                                file: String::new(),
                                start_line: 0,
                            });
                        }
                        continue;
                    };
                    hits.push(Hit {
                        node_id: payload.node_id,
                        score: point.score,
                        snippet: payload.snippet,
                        file: payload.file,
                        start_line: payload.start_line,
                    });
                }
                hits
            }
            Err(RepoLensError::IndexNotReady(reason)) => {
                warn!("index not ready ({}), using keyword scan", reason);
                self.keyword_scan(query, top_k, collection).await?
            }
            Err(e) => return Err(e),
        };

        debug!("search '{}' -> {} hits", query, results.len());
        Ok(SearchOutput {
            total_results: results.len(),
            results,
            query: query.to_string(),
        })
    }

    fn node_id_from_journal(&self, point_id: u64) -> Option<String> {
        self.journal.read_map().ok()?.get(&point_id).cloned()
    }

    async fn keyword_scan(&self, query: &str, top_k: usize, collection: &str) -> Result<Vec<Hit>> {
        let payloads = self.index.scroll_payloads(collection).await?;
        let mut hits: Vec<Hit> = payloads
            .into_iter()
            .filter_map(|(_, payload)| {
                let score = keyword_score(query, &payload);
                if score <= 0.0 {
                    return None;
                }
                Some(Hit {
                    node_id: payload.node_id,
                    score,
                    snippet: payload.snippet,
                    file: payload.file,
                    start_line: payload.start_line,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// The frozen keyword-scan scoring rule: a case-insensitive substring match
/// contributes 0.8 in the snippet, 0.7 in the doc, 0.6 in the node id and
/// 0.4 in the file path; matches sum.
pub fn keyword_score(query: &str, payload: &NodePayload) -> f32 {
    let needle = query.to_lowercase();
    let mut score = 0.0;
    if payload.snippet.to_lowercase().contains(&needle) {
        score += 0.8;
    }
    if payload.doc.to_lowercase().contains(&needle) {
        score += 0.7;
    }
    if payload.node_id.to_lowercase().contains(&needle) {
        score += 0.6;
    }
    if payload.file.to_lowercase().contains(&needle) {
        score += 0.4;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(node_id: &str, snippet: &str, doc: &str, file: &str) -> NodePayload {
        NodePayload {
            node_id: node_id.to_string(),
            name: String::new(),
            snippet: snippet.to_string(),
            file: file.to_string(),
            start_line: 1,
            end_line: 1,
            doc: doc.to_string(),
        }
    }

    #[test]
    fn keyword_scores_follow_the_frozen_rule() {
        let p = payload("function:save:db.py:1", "def save(record):", "", "db.py");
        assert!((keyword_score("save", &p) - (0.8 + 0.6)).abs() < 1e-6);
        assert!((keyword_score("db", &p) - (0.6 + 0.4)).abs() < 1e-6);
        assert_eq!(keyword_score("nothing-matches", &p), 0.0);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let p = payload("function:Save:db.py:1", "def Save():", "", "other.py");
        assert!(keyword_score("SAVE", &p) > 0.0);
    }

    #[test]
    fn doc_only_match_scores_point_seven() {
        let p = payload("function:x:x.py:1", "def x():", "persists widgets", "x.py");
        assert!((keyword_score("widgets", &p) - 0.7).abs() < 1e-6);
    }
}
