use crate::jobs::JobKind;
use crate::state::AppState;
use repolens_core::{RepoLensError, Result};
use repolens_graph::DependencyGraph;
use repolens_parser::{fetch_repository, RepoParser};
use repolens_vector::{
    build_points, journal_outcome, point_map, push_points, Embedder as _, IndexOutcome,
};
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(120);
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(600);
pub const UPSERT_TIMEOUT: Duration = Duration::from_secs(300);
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ParseSpec {
    pub repo_url: Option<String>,
    pub repo_path: Option<PathBuf>,
    pub branch: String,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub collection: String,
    pub graph_path: Option<PathBuf>,
    pub recreate: bool,
}

/// Phase outcome: either a value or an observed cancellation request.
enum Phase<T> {
    Done(T),
    Cancelled,
}

pub fn spawn_parse_job(state: &AppState, spec: ParseSpec) -> String {
    let job_id = state.registry.create(JobKind::Parse);
    spawn(state.clone(), job_id.clone(), move |state, id| async move {
        parse_phases(&state, &id, &spec).await
    });
    job_id
}

pub fn spawn_index_job(state: &AppState, spec: IndexSpec) -> String {
    let job_id = state.registry.create(JobKind::Index);
    spawn(state.clone(), job_id.clone(), move |state, id| async move {
        index_phases(&state, &id, &spec).await
    });
    job_id
}

pub fn spawn_parse_and_index_job(state: &AppState, parse: ParseSpec, index: IndexSpec) -> String {
    let job_id = state.registry.create(JobKind::ParseAndIndex);
    spawn(state.clone(), job_id.clone(), move |state, id| async move {
        let parse_result = match parse_phases(&state, &id, &parse).await? {
            Phase::Done(result) => result,
            Phase::Cancelled => return Ok(Phase::Cancelled),
        };
        let index_result = match index_phases(&state, &id, &index).await? {
            Phase::Done(result) => result,
            Phase::Cancelled => return Ok(Phase::Cancelled),
        };
        Ok(Phase::Done(json!({
            "parse": parse_result,
            "index": index_result,
        })))
    });
    job_id
}

/// Common job envelope: take a worker permit, run the phases, record the
/// final state on the registry. Workers never panic the server; every error
/// lands on the job record.
fn spawn<F, Fut>(state: AppState, job_id: String, phases: F)
where
    F: FnOnce(AppState, String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Phase<serde_json::Value>>> + Send + 'static,
{
    tokio::spawn(async move {
        let Ok(_permit) = state.workers.clone().acquire_owned().await else {
            return;
        };
        state.registry.mark_running(&job_id);

        match phases(state.clone(), job_id.clone()).await {
            Ok(Phase::Done(result)) => {
                state.registry.complete(&job_id, result);
                info!("job {} completed", job_id);
            }
            Ok(Phase::Cancelled) => {
                state.registry.mark_cancelled(&job_id);
                info!("job {} cancelled", job_id);
            }
            Err(e) => {
                warn!("job {} failed: {}", job_id, e);
                state.registry.fail(&job_id, &e);
            }
        }
    });
}

fn is_cancelled(state: &AppState, job_id: &str) -> bool {
    state.registry.cancel_flag(job_id).load(Ordering::SeqCst)
}

async fn parse_phases(
    state: &AppState,
    job_id: &str,
    spec: &ParseSpec,
) -> Result<Phase<serde_json::Value>> {
    // fetch
    let (repo_root, cloned) = match (&spec.repo_url, &spec.repo_path) {
        (Some(url), _) => {
            state.registry.set_progress(job_id, "fetching repository");
            let url = url.clone();
            let branch = spec.branch.clone();
            let tmp = state.settings.tmp_dir.clone();
            let root = with_timeout(
                "fetch",
                FETCH_TIMEOUT,
                blocking(move || fetch_repository(&url, &branch, &tmp)),
            )
            .await?;
            (root, true)
        }
        (None, Some(path)) => {
            if !path.is_dir() {
                return Err(RepoLensError::InvalidInput(format!(
                    "repository path does not exist: {}",
                    path.display()
                )));
            }
            (path.clone(), false)
        }
        (None, None) => {
            return Err(RepoLensError::InvalidInput(
                "either repo_url or repo_path must be provided".to_string(),
            ));
        }
    };

    if is_cancelled(state, job_id) {
        cleanup_clone(cloned, &repo_root);
        return Ok(Phase::Cancelled);
    }

    // parse (CPU-bound, unbounded)
    state.registry.set_progress(job_id, "parsing repository");
    let parse_root = repo_root.clone();
    let parsed = blocking(move || RepoParser::new().parse_repository(&parse_root)).await?;

    if is_cancelled(state, job_id) {
        cleanup_clone(cloned, &repo_root);
        return Ok(Phase::Cancelled);
    }

    // persist graph under the per-path lock
    state.registry.set_progress(job_id, "saving graph");
    let output_path = spec
        .output_path
        .clone()
        .unwrap_or_else(|| state.settings.graph_path());
    let graph = DependencyGraph::from_parts(parsed.nodes, parsed.edges);
    let stats = graph.stats();
    {
        let lock = state.path_lock(&output_path);
        let _guard = lock.lock().await;
        graph.save(&output_path)?;
    }
    *state.graph.write().await = graph;

    cleanup_clone(cloned, &repo_root);

    Ok(Phase::Done(json!({
        "graph_path": output_path,
        "nodes": stats.node_count,
        "edges": stats.edge_count,
        "stats": stats,
        "files_parsed": parsed.report.files_parsed,
        "files_skipped": parsed.report.files_skipped,
        "failures": parsed.report.failures,
    })))
}

async fn index_phases(
    state: &AppState,
    job_id: &str,
    spec: &IndexSpec,
) -> Result<Phase<serde_json::Value>> {
    // load graph
    state.registry.set_progress(job_id, "loading graph");
    let graph_path = spec
        .graph_path
        .clone()
        .unwrap_or_else(|| state.settings.graph_path());
    if graph_path.exists() {
        let path = graph_path.clone();
        let loaded = blocking(move || DependencyGraph::load(&path)).await?;
        *state.graph.write().await = loaded;
    } else if state.graph.read().await.is_empty() {
        return Err(RepoLensError::NotFound(format!(
            "graph file not found: {}",
            graph_path.display()
        )));
    }

    if is_cancelled(state, job_id) {
        return Ok(Phase::Cancelled);
    }

    // embed
    state.registry.set_progress(job_id, "embedding documents");
    let embedder = state.embedder.clone();
    let graph = state.graph.clone();
    let points = with_timeout(
        "embed",
        EMBED_TIMEOUT,
        blocking(move || {
            let graph = graph.blocking_read();
            build_points(embedder.as_ref(), &graph)
        }),
    )
    .await?;
    let map = point_map(&points);

    if is_cancelled(state, job_id) {
        return Ok(Phase::Cancelled);
    }

    // upsert
    state.registry.set_progress(job_id, "upserting points");
    let written = with_timeout(
        "upsert",
        UPSERT_TIMEOUT,
        push_points(
            state.index.as_ref(),
            &spec.collection,
            state.embedder.dimension(),
            spec.recreate,
            &points,
        ),
    )
    .await?;

    // A cancellation observed here stops before the journal rename; the
    // vector index keeps the points it accepted.
    if is_cancelled(state, job_id) {
        return Ok(Phase::Cancelled);
    }

    // journal
    state.registry.set_progress(job_id, "writing journal");
    let outcome = IndexOutcome {
        collection: spec.collection.clone(),
        model: state.embedder.model_name().to_string(),
        vector_size: state.embedder.dimension(),
        points_count: written,
    };
    journal_outcome(&state.journal, &outcome, &map)?;

    Ok(Phase::Done(serde_json::to_value(&outcome)?))
}

fn cleanup_clone(cloned: bool, root: &PathBuf) {
    if cloned {
        if let Err(e) = std::fs::remove_dir_all(root) {
            warn!("could not remove clone at {}: {}", root.display(), e);
        }
    }
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| RepoLensError::Internal(format!("worker task failed: {}", e)))?
}

pub async fn with_timeout<T>(
    phase: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RepoLensError::Timeout(format!(
            "{} phase exceeded {} s",
            phase,
            limit.as_secs()
        ))),
    }
}
