use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use repolens_core::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directories that never contain first-party source worth indexing.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/target/**",
    "**/build/**",
    "**/dist/**",
    "**/out/**",
    "**/node_modules/**",
    "**/__pycache__/**",
    "**/.pytest_cache/**",
    "**/.venv/**",
    "**/venv/**",
    "**/vendor/**",
    "**/coverage/**",
];

/// Extensions that are never source code, checked before grammar dispatch.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "pdf", "zip", "gz", "tar", "so", "dylib", "dll", "exe",
    "bin", "o", "a", "class", "pyc", "wasm", "woff", "woff2", "ttf",
];

#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub exclude_patterns: Vec<String>,
    /// Maximum file size in bytes; larger files are skipped.
    pub max_file_size: u64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            max_file_size: 2 * 1024 * 1024,
        }
    }
}

/// Walk a repository tree and return candidate source files, honoring
/// gitignore rules, the conventional ignore set and binary extensions.
pub fn collect_source_files(root: &Path, config: &CollectConfig) -> Result<Vec<PathBuf>> {
    let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    patterns.extend(config.exclude_patterns.clone());
    let exclude_set = build_globset(&patterns);

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .build();

    let mut files = Vec::new();
    let mut seen = 0usize;

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("walk error under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        seen += 1;

        if let Some(ref set) = exclude_set {
            if set.is_match(path) {
                continue;
            }
        }

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                continue;
            }
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > config.max_file_size {
            debug!("skipping oversized file {} ({} bytes)", path.display(), size);
            continue;
        }

        files.push(path.to_path_buf());
    }

    // Deterministic parse order regardless of filesystem iteration order.
    files.sort();

    info!(
        "collected {} candidate files out of {} under {}",
        files.len(),
        seen,
        root.display()
    );
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut added = false;
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
                added = true;
            }
            Err(e) => warn!("invalid glob pattern '{}': {}", pattern, e),
        }
    }
    if added {
        builder.build().ok()
    } else {
        None
    }
}
