use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use repolens_core::RepoLensError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Parse,
    Index,
    ParseAndIndex,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Parse => "parse",
            JobKind::Index => "index",
            JobKind::ParseAndIndex => "parse_and_index",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: String,
    pub message: String,
}

impl From<&RepoLensError> for JobError {
    fn from(error: &RepoLensError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// One tracked pipeline execution. Snapshots of this record are what the
/// status endpoint returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

#[derive(Debug, Serialize)]
pub struct JobsSummary {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub jobs: BTreeMap<String, Job>,
}

/// Registry of all jobs in this process. Owned by the service and handed to
/// workers explicitly; ids are unique and monotonically increasing, state
/// transitions only move forward, and completed records stay until deleted.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Job>,
    cancel_flags: DashMap<String, Arc<AtomicBool>>,
    counter: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, kind: JobKind) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("{}_{}", kind, sequence);
        let job = Job {
            job_id: job_id.clone(),
            kind,
            state: JobState::Pending,
            started_at: now(),
            finished_at: None,
            progress: None,
            result: None,
            error: None,
        };
        self.jobs.insert(job_id.clone(), job);
        self.cancel_flags
            .insert(job_id.clone(), Arc::new(AtomicBool::new(false)));
        info!("created job {}", job_id);
        job_id
    }

    pub fn mark_running(&self, job_id: &str) {
        self.transition(job_id, JobState::Running, |job| {
            job.state == JobState::Pending
        });
    }

    pub fn set_progress(&self, job_id: &str, phase: &str) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            if !job.state.is_terminal() {
                job.progress = Some(phase.to_string());
            }
        }
    }

    pub fn complete(&self, job_id: &str, result: serde_json::Value) {
        self.transition(job_id, JobState::Completed, |job| !job.state.is_terminal());
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            if job.state == JobState::Completed {
                job.result = Some(result);
            }
        }
    }

    pub fn fail(&self, job_id: &str, error: &RepoLensError) {
        self.transition(job_id, JobState::Failed, |job| !job.state.is_terminal());
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            if job.state == JobState::Failed {
                job.error = Some(JobError::from(error));
            }
        }
    }

    pub fn mark_cancelled(&self, job_id: &str) {
        self.transition(job_id, JobState::Cancelled, |job| !job.state.is_terminal());
    }

    /// Request cancellation; the running worker honors it at its next
    /// phase boundary.
    pub fn request_cancel(&self, job_id: &str) -> bool {
        match self.cancel_flags.get(job_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn cancel_flag(&self, job_id: &str) -> Arc<AtomicBool> {
        self.cancel_flags
            .get(job_id)
            .map(|flag| flag.clone())
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)))
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|job| job.clone())
    }

    pub fn delete(&self, job_id: &str) -> bool {
        self.cancel_flags.remove(job_id);
        self.jobs.remove(job_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| !entry.value().state.is_terminal())
            .count()
    }

    pub fn summary(&self) -> JobsSummary {
        let jobs: BTreeMap<String, Job> = self
            .jobs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        JobsSummary {
            total: jobs.len(),
            active: jobs.values().filter(|j| !j.state.is_terminal()).count(),
            completed: jobs
                .values()
                .filter(|j| j.state == JobState::Completed)
                .count(),
            failed: jobs.values().filter(|j| j.state == JobState::Failed).count(),
            jobs,
        }
    }

    fn transition(&self, job_id: &str, to: JobState, allowed: impl Fn(&Job) -> bool) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            if allowed(&job) {
                job.state = to;
                if to.is_terminal() {
                    job.finished_at = Some(now());
                    job.progress = None;
                }
            }
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_kind_prefixed() {
        let registry = JobRegistry::new();
        let first = registry.create(JobKind::Parse);
        let second = registry.create(JobKind::Index);
        let third = registry.create(JobKind::ParseAndIndex);
        assert_eq!(first, "parse_1");
        assert_eq!(second, "index_2");
        assert_eq!(third, "parse_and_index_3");
    }

    #[test]
    fn transitions_only_move_forward() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Parse);
        assert_eq!(registry.get(&id).unwrap().state, JobState::Pending);

        registry.mark_running(&id);
        assert_eq!(registry.get(&id).unwrap().state, JobState::Running);

        registry.complete(&id, serde_json::json!({"nodes": 1}));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.finished_at.is_some());

        // terminal states are sticky
        registry.fail(&id, &RepoLensError::Internal("late".into()));
        let job = registry.get(&id).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.error.is_none());

        // running cannot go back to pending either
        let id2 = registry.create(JobKind::Parse);
        registry.mark_running(&id2);
        registry.mark_running(&id2);
        assert_eq!(registry.get(&id2).unwrap().state, JobState::Running);
    }

    #[test]
    fn completed_jobs_are_retained_until_deleted() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Index);
        registry.mark_running(&id);
        registry.complete(&id, serde_json::json!({}));

        assert!(registry.get(&id).is_some());
        assert!(registry.delete(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.delete(&id));
    }

    #[test]
    fn cancel_request_sets_the_flag() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Parse);
        let flag = registry.cancel_flag(&id);
        assert!(!flag.load(Ordering::SeqCst));

        assert!(registry.request_cancel(&id));
        assert!(flag.load(Ordering::SeqCst));

        registry.mark_cancelled(&id);
        assert_eq!(registry.get(&id).unwrap().state, JobState::Cancelled);
        assert!(!registry.request_cancel("nope"));
    }

    #[test]
    fn summary_counts_by_state() {
        let registry = JobRegistry::new();
        let a = registry.create(JobKind::Parse);
        let b = registry.create(JobKind::Parse);
        let c = registry.create(JobKind::Index);
        registry.mark_running(&a);
        registry.complete(&b, serde_json::json!({}));
        registry.fail(&c, &RepoLensError::ParseFailed("x".into()));

        let summary = registry.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.jobs.contains_key(&a));
    }
}
