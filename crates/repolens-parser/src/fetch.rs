use git2::build::RepoBuilder;
use git2::FetchOptions;
use repolens_core::{RepoLensError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Clone `url` at `branch` into a fresh directory under `dest_root` and
/// return the checkout path. A shallow history is enough: the parser only
/// reads the working tree.
pub fn fetch_repository(url: &str, branch: &str, dest_root: &Path) -> Result<PathBuf> {
    let name = repo_dir_name(url);
    let dest = dest_root.join(name);
    if dest.exists() {
        std::fs::remove_dir_all(&dest)?;
    }
    std::fs::create_dir_all(dest_root)?;

    info!("cloning {} (branch {}) into {}", url, branch, dest.display());

    let mut fetch_options = FetchOptions::new();
    fetch_options.depth(1);

    RepoBuilder::new()
        .branch(branch)
        .fetch_options(fetch_options)
        .clone(url, &dest)
        .map_err(|e| RepoLensError::FetchFailed(format!("{}: {}", url, e.message())))?;

    Ok(dest)
}

fn repo_dir_name(url: &str) -> String {
    let tail = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("repo");
    let name = tail.trim_end_matches(".git");
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}
