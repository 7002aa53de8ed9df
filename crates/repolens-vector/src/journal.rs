use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use repolens_core::{RepoLensError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Completed,
    Partial,
    Failed,
}

/// Status snapshot written next to the point map after an indexing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub collection: String,
    pub model: String,
    pub vector_size: usize,
    pub distance: String,
    pub points_count: usize,
    /// ISO-8601 UTC.
    pub indexed_at: String,
    pub status: IndexState,
}

impl IndexStatus {
    pub fn completed(collection: &str, model: &str, vector_size: usize, points: usize) -> Self {
        Self {
            collection: collection.to_string(),
            model: model.to_string(),
            vector_size,
            distance: "Cosine".to_string(),
            points_count: points,
            indexed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            status: IndexState::Completed,
        }
    }
}

/// The two sidecar artifacts that survive an indexing run: the
/// point-id-to-node-id map and the status document. Writes go through a
/// temp file plus atomic rename, serialized by a per-journal mutex, so a
/// reader sees either the previous complete file or the new one.
pub struct Journal {
    map_path: PathBuf,
    status_path: PathBuf,
    lock: Mutex<()>,
}

impl Journal {
    pub fn new(map_path: PathBuf, status_path: PathBuf) -> Self {
        Self {
            map_path,
            status_path,
            lock: Mutex::new(()),
        }
    }

    pub fn map_path(&self) -> &Path {
        &self.map_path
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    pub fn write_map(&self, map: &BTreeMap<u64, String>) -> Result<()> {
        let _guard = self.lock.lock();
        write_atomic(&self.map_path, map)?;
        info!("wrote {} point mappings to {}", map.len(), self.map_path.display());
        Ok(())
    }

    pub fn read_map(&self) -> Result<BTreeMap<u64, String>> {
        let text = std::fs::read_to_string(&self.map_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepoLensError::NotFound(format!("{}", self.map_path.display()))
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write_status(&self, status: &IndexStatus) -> Result<()> {
        let _guard = self.lock.lock();
        write_atomic(&self.status_path, status)?;
        info!(
            "wrote index status ({:?}, {} points) to {}",
            status.status,
            status.points_count,
            self.status_path.display()
        );
        Ok(())
    }

    pub fn read_status(&self) -> Result<IndexStatus> {
        let text = std::fs::read_to_string(&self.status_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepoLensError::NotFound(format!("{}", self.status_path.display()))
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal(dir: &Path) -> Journal {
        Journal::new(dir.join("qdrant_map.json"), dir.join("index_status.json"))
    }

    #[test]
    fn map_round_trips_with_string_keys_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal(dir.path());

        let mut map = BTreeMap::new();
        map.insert(1u64, "function:a:a.py:1".to_string());
        map.insert(2u64, "function:b:b.py:1".to_string());
        journal.write_map(&map).unwrap();

        // on-disk keys are stringified point ids
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(journal.map_path()).unwrap()).unwrap();
        assert_eq!(raw["1"], "function:a:a.py:1");

        assert_eq!(journal.read_map().unwrap(), map);
    }

    #[test]
    fn status_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal(dir.path());

        let status = IndexStatus::completed("repolens", "all-MiniLM-L6-v2", 384, 128);
        journal.write_status(&status).unwrap();
        let back = journal.read_status().unwrap();
        assert_eq!(back, status);
        assert_eq!(back.distance, "Cosine");
        // RFC 3339 timestamps parse back
        assert!(chrono::DateTime::parse_from_rfc3339(&back.indexed_at).is_ok());
    }

    #[test]
    fn missing_artifacts_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let journal = journal(dir.path());
        assert_eq!(journal.read_map().unwrap_err().kind(), "NotFound");
        assert_eq!(journal.read_status().unwrap_err().kind(), "NotFound");
    }
}
