use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::BuildJob;
use crate::error::BuildError;

/// Tracks which targets have a job running and the last finished job of each.
///
/// At most one job may run per target; the registry does not limit how many
/// different targets run at once.
pub struct JobRegistry {
    running: Arc<RwLock<HashMap<String, Uuid>>>,
    finished: Arc<RwLock<HashMap<String, BuildJob>>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            running: Arc::new(RwLock::new(HashMap::new())),
            finished: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Claims `repo_id` for `job_id`. The claim is released when the guard drops.
    pub fn begin(&self, repo_id: &str, job_id: Uuid) -> Result<RunningGuard, BuildError> {
        let mut running = self.running.write();
        if running.contains_key(repo_id) {
            return Err(BuildError::AlreadyRunning(repo_id.to_string()));
        }
        running.insert(repo_id.to_string(), job_id);
        Ok(RunningGuard {
            repo_id: repo_id.to_string(),
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self, repo_id: &str) -> bool {
        self.running.read().contains_key(repo_id)
    }

    pub fn finish(&self, job: &BuildJob) {
        self.finished.write().insert(job.repo_id.clone(), job.clone());
    }

    pub fn last_job(&self, repo_id: &str) -> Option<BuildJob> {
        self.finished.read().get(repo_id).cloned()
    }
}

impl Clone for JobRegistry {
    fn clone(&self) -> Self {
        Self {
            running: self.running.clone(),
            finished: self.finished.clone(),
        }
    }
}

pub struct RunningGuard {
    repo_id: String,
    running: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.write().remove(&self.repo_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_for_same_target_is_rejected() {
        let registry = JobRegistry::new();
        let guard = registry.begin("zesarux", Uuid::new_v4()).unwrap();
        assert!(registry.is_running("zesarux"));
        assert!(matches!(
            registry.begin("zesarux", Uuid::new_v4()),
            Err(BuildError::AlreadyRunning(_))
        ));
        // Different targets are independent.
        let _other = registry.begin("fuse", Uuid::new_v4()).unwrap();

        drop(guard);
        assert!(!registry.is_running("zesarux"));
        assert!(registry.begin("zesarux", Uuid::new_v4()).is_ok());
    }
}
