use std::env;
use std::path::PathBuf;

/// Runtime settings, read once from the environment at startup. Every knob
/// has a default so the service runs with no configuration at all.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory for persisted artifacts: graph.json and the index journal.
    pub data_dir: PathBuf,
    /// Scratch directory for repository clones.
    pub tmp_dir: PathBuf,
    /// gRPC endpoint of the external vector index.
    pub qdrant_url: String,
    /// Default collection name when a request does not name one.
    pub collection: String,
    /// Embedding model identifier.
    pub model_name: String,
    /// Optional endpoint of the external summarizer collaborator.
    pub summarizer_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Worker pool size for background jobs.
    pub workers: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let tmp_dir = env::var("TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir());

        Self {
            data_dir,
            tmp_dir,
            qdrant_url: env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6334".to_string()),
            collection: env::var("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|_| "repolens".to_string()),
            model_name: env::var("MODEL_NAME")
                .unwrap_or_else(|_| "all-MiniLM-L6-v2".to_string()),
            summarizer_url: env::var("SUMMARIZER_URL").ok().filter(|s| !s.is_empty()),
            host: env::var("WORKER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("WORKER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8002),
            workers: std::cmp::max(2, num_cpus::get()),
        }
    }

    pub fn graph_path(&self) -> PathBuf {
        self.data_dir.join("graph.json")
    }

    pub fn map_path(&self) -> PathBuf {
        self.data_dir.join("qdrant_map.json")
    }

    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join("index_status.json")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            tmp_dir: env::temp_dir(),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "repolens".to_string(),
            model_name: "all-MiniLM-L6-v2".to_string(),
            summarizer_url: None,
            host: "0.0.0.0".to_string(),
            port: 8002,
            workers: std::cmp::max(2, num_cpus::get()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let settings = Settings::default();
        assert!(settings.workers >= 2);
        assert_eq!(settings.graph_path(), PathBuf::from("./data/graph.json"));
        assert_eq!(settings.map_path(), PathBuf::from("./data/qdrant_map.json"));
        assert_eq!(
            settings.status_path(),
            PathBuf::from("./data/index_status.json")
        );
    }
}
