//! Job Registry (C5): the process-wide table of in-flight and finished
//! jobs, keyed by an atomically-allocated id.
//!
//! Grounded on `scheduler.rs`'s HashMap-keyed client/worker registries:
//! same "lock a map, clone out an Arc handle, drop the lock" discipline,
//! scaled down from the broker's multiple registries to one.

use crate::error::AgentError;
use crate::job::Job;
use remote_agent_proto::JobId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct JobRegistry {
    next_id: AtomicU64,
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry {
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn allocate_id(&self) -> JobId {
        JobId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn put(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id(), job);
    }

    pub fn try_get(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// Kills a still-running job and removes it from the registry so
    /// subsequent lookups fail with `InvalidJobId`. Fails with
    /// `JobAlreadyFinished` if the job has already exited (it is left in
    /// place so its result remains retrievable via `GetJobResult`).
    pub fn stop_job(&self, id: JobId) -> Result<bool, AgentError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get(&id).cloned().ok_or(AgentError::InvalidJobId(id.0))?;
        if job.is_done() {
            return Err(AgentError::JobAlreadyFinished(id.0));
        }
        job.kill();
        jobs.remove(&id);
        Ok(true)
    }

    /// Snapshot of every known job id and whether it has finished, for
    /// `GetAllJobs`.
    pub fn snapshot(&self) -> Vec<(JobId, bool)> {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .map(|job| (job.id(), job.is_done()))
            .collect()
    }

    pub fn try_remove(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().unwrap().remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSpec;
    use std::time::Duration;

    fn spec(program: &str, args: &[&str]) -> JobSpec {
        JobSpec {
            program_name: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            completion_callback: None,
            progress_endpoint: None,
            network_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn allocate_id_starts_at_one_and_increments() {
        let registry = JobRegistry::new();
        assert_eq!(registry.allocate_id(), JobId(1));
        assert_eq!(registry.allocate_id(), JobId(2));
        assert_eq!(registry.allocate_id(), JobId(3));
    }

    #[tokio::test]
    async fn stop_job_kills_running_and_removes_it() {
        let registry = JobRegistry::new();

        let running_id = registry.allocate_id();
        let running = Job::create(running_id, spec("sh", &["-c", "sleep 30"])).unwrap();
        registry.put(running);
        assert!(registry.stop_job(running_id).unwrap());
        assert!(registry.try_get(running_id).is_none());
    }

    #[tokio::test]
    async fn stop_job_on_finished_job_fails_and_preserves_it() {
        let registry = JobRegistry::new();

        let done_id = registry.allocate_id();
        let done = Job::create(done_id, spec("true", &[])).unwrap();
        done.wait_until_finished().await;
        registry.put(done);
        assert!(matches!(
            registry.stop_job(done_id).unwrap_err(),
            AgentError::JobAlreadyFinished(id) if id == done_id.0
        ));
        assert!(registry.try_get(done_id).is_some());
    }

    #[test]
    fn stop_job_on_unknown_id_is_invalid_job_id() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.stop_job(JobId(999)).unwrap_err(),
            AgentError::InvalidJobId(999)
        ));
    }
}
